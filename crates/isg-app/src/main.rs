//! ISG 命令行程序
//!
//! 操作一个 `.isg` 工作文件：建立边界与形状、选取模板、定义规则、迭代生成设计。
//! 所有修改场景的命令执行后都会写回工作文件。

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use isg_core::definition::Definition;
use isg_core::entity::EntityId;
use isg_core::math::{BoundingBox2, Point2};
use isg_core::polygon::sort_vertices;
use isg_core::transform::Transform2D;
use isg_engine::rules::merge::MergeOptions;
use isg_engine::rules::replace::ReplaceOptions;
use isg_engine::rules::stretch::StretchOptions;
use isg_engine::session::ISG_DICTIONARY;
use isg_engine::{ApplyOutcome, Controller, EngineConfig};
use isg_file::Document;

const BOUNDARY_DEFINITION: &str = "Boundary";

#[derive(Parser)]
#[clap(author, version, about = "Iterative shape grammar generator", long_about = None)]
struct Cli {
    /// 引擎配置文件（JSON）
    #[clap(long, global = true)]
    config: Option<PathBuf>,
    /// 随机种子，覆盖配置文件中的设置
    #[clap(long, global = true)]
    seed: Option<u64>,
    /// 输出调试日志
    #[clap(long, short, global = true)]
    verbose: bool,
    /// 工作文件（.isg）
    #[clap(value_parser)]
    file: PathBuf,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 新建工作文件
    New {
        /// 矩形边界：x0,y0,x1,y1
        #[clap(long)]
        boundary: Option<String>,
    },
    /// 添加多边形定义；不给顶点时为原点标记
    AddDefinition {
        name: String,
        /// 顶点："x,y x,y ..."
        #[clap(long)]
        points: Option<String>,
        /// 按极角重新排列顶点，输入顺序不限
        #[clap(long)]
        sort: bool,
    },
    /// 放置定义的实例
    Place {
        definition: String,
        /// 放置位置：x,y
        #[clap(long)]
        at: String,
        /// 目标图层，默认为解图层
        #[clap(long)]
        layer: Option<String>,
        #[clap(long)]
        mirror_x: bool,
        #[clap(long)]
        mirror_y: bool,
    },
    /// 列出场景中的实体
    List,
    /// 初始化并打印概要
    Init {
        /// 边界实体ID
        #[clap(long)]
        boundary: Option<String>,
    },
    /// 选取规则的原始形状（原点标记加一到两个形状）
    PickOriginal { ids: Vec<String> },
    /// 选取规则的新形状（原点标记加若干形状）
    PickNew { ids: Vec<String> },
    /// 由已选取的形状定义替换规则
    DefineReplace {
        #[clap(long)]
        name: Option<String>,
        #[clap(long)]
        mirror_x: bool,
        #[clap(long)]
        mirror_y: bool,
        #[clap(long)]
        disable_overlap: bool,
        #[clap(long)]
        overwrite: bool,
    },
    /// 定义合并规则
    DefineMerge {
        #[clap(long)]
        name: Option<String>,
        #[clap(long = "x")]
        merge_x: bool,
        #[clap(long = "y")]
        merge_y: bool,
        #[clap(long)]
        count: usize,
        /// 逗号分隔的定义名
        #[clap(long)]
        definitions: String,
        #[clap(long, default_value_t = 1.0)]
        max_distance: f64,
        #[clap(long)]
        overwrite: bool,
    },
    /// 定义拉伸规则
    DefineStretch {
        #[clap(long)]
        name: Option<String>,
        #[clap(long = "x")]
        stretch_x: bool,
        #[clap(long = "y")]
        stretch_y: bool,
        #[clap(long)]
        min: f64,
        #[clap(long)]
        max: f64,
        /// 逗号分隔的定义名
        #[clap(long)]
        definitions: String,
        #[clap(long)]
        constrain_connecting: bool,
        #[clap(long)]
        overwrite: bool,
    },
    /// 列出规则
    Rules,
    /// 迭代生成设计
    Generate {
        /// 规则应用次数
        #[clap(short = 'n', long)]
        count: Option<usize>,
        /// 逗号分隔的规则名；为空时使用全部规则
        #[clap(long)]
        rules: Option<String>,
        /// 超时（秒）
        #[clap(long)]
        timeout: Option<u64>,
    },
    /// 对选中的实体应用一条规则
    Apply {
        rule: String,
        ids: Vec<String>,
        #[clap(long, default_value_t = 5.0)]
        factor_x: f64,
        #[clap(long, default_value_t = 5.0)]
        factor_y: f64,
    },
    /// 撤销产生该形状的合并
    Undo { id: String },
    /// 清空解
    Reset,
}

/// 解析 "x,y"
fn parse_point(text: &str) -> Result<Point2> {
    let values = parse_numbers(text)?;
    match values.as_slice() {
        [x, y] => Ok(Point2::new(*x, *y)),
        _ => bail!("expected x,y but got '{text}'"),
    }
}

/// 解析空白分隔的 "x,y x,y ..."
fn parse_points(text: &str) -> Result<Vec<Point2>> {
    text.split_whitespace().map(parse_point).collect()
}

fn parse_numbers(text: &str) -> Result<Vec<f64>> {
    text.split(',')
        .map(|s| {
            s.trim()
                .parse::<f64>()
                .with_context(|| format!("invalid number '{s}'"))
        })
        .collect()
}

/// 解析 "x0,y0,x1,y1"
fn parse_rectangle(text: &str) -> Result<BoundingBox2> {
    let values = parse_numbers(text)?;
    let [x0, y0, x1, y1] = values.as_slice() else {
        bail!("expected x0,y0,x1,y1 but got '{text}'");
    };
    let corners = [Point2::new(*x0, *y0), Point2::new(*x1, *y1)];
    let bounds = BoundingBox2::from_points(&corners);
    if bounds.width() <= 0.0 || bounds.height() <= 0.0 {
        bail!("boundary rectangle '{text}' is degenerate");
    }
    Ok(bounds)
}

/// 解析实体ID，允许 `#` 前缀
fn parse_entity_id(text: &str) -> Result<EntityId> {
    let raw = text.trim_start_matches('#');
    let id: u64 = raw
        .parse()
        .with_context(|| format!("invalid entity id '{text}'"))?;
    Ok(EntityId::from_raw(id, 0))
}

fn parse_entity_ids(ids: &[String]) -> Result<Vec<EntityId>> {
    ids.iter().map(|s| parse_entity_id(s)).collect()
}

/// 逗号分隔的名称列表，忽略空项
fn parse_names(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    Ok(match cli.seed {
        Some(seed) => config.with_seed(seed),
        None => config,
    })
}

fn open_document(cli: &Cli) -> Result<Document> {
    Document::open(&cli.file).with_context(|| format!("failed to open {}", cli.file.display()))
}

fn open_controller(cli: &Cli, config: EngineConfig, boundary: Option<EntityId>) -> Result<Controller> {
    let document = open_document(cli)?;
    Ok(Controller::initialize(document, boundary, config)?)
}

/// 新建工作文件：四个分区图层，可选的矩形边界
fn create_workspace(cli: &Cli, config: &EngineConfig, boundary: Option<&str>) -> Result<()> {
    if cli.file.exists() {
        bail!("{} already exists", cli.file.display());
    }
    let mut document = Document::new();
    for layer in [
        &config.solution_layer,
        &config.rules_layer,
        &config.boundary_layer,
        &config.hidden_layer,
    ] {
        document.ensure_layer(layer);
    }

    if let Some(text) = boundary {
        let bounds = parse_rectangle(text)?;
        document.add_definition(Definition::rectangle(
            BOUNDARY_DEFINITION,
            bounds.width(),
            bounds.height(),
        ))?;
        let id = document.place_instance(
            BOUNDARY_DEFINITION,
            Transform2D::translation(bounds.min.x, bounds.min.y),
            &config.boundary_layer,
        )?;
        info!("Placed boundary {}", id);
    }

    document.save_as(&cli.file)?;
    info!("Created {}", cli.file.display());
    Ok(())
}

fn add_definition(document: &mut Document, name: &str, points: Option<&str>, sort: bool) -> Result<()> {
    let definition = match points {
        None => Definition::marker(name),
        Some(text) => {
            let mut points = parse_points(text)?;
            if points.len() < 3 {
                bail!("a polygon needs at least three points");
            }
            if sort {
                points = sort_vertices(&points);
            }
            Definition::polygon(name, points)
        }
    };
    document.add_definition(definition)?;
    Ok(())
}

/// 放置实例；镜像绕定义包围盒中心进行，并记录在实体属性中
fn place(
    document: &mut Document,
    config: &EngineConfig,
    definition: &str,
    at: Point2,
    layer: Option<&str>,
    mirror: (bool, bool),
) -> Result<EntityId> {
    let local_center = {
        let def = document
            .definition(definition)
            .ok_or_else(|| anyhow!("unknown definition '{definition}'"))?;
        BoundingBox2::from_points(&def.vertices()).center()
    };
    let sign = |mirrored: bool| if mirrored { -1.0 } else { 1.0 };
    let transform = Transform2D::translation(at.x, at.y)
        .then(&Transform2D::scale_around(local_center, sign(mirror.0), sign(mirror.1)));

    let layer = layer.unwrap_or(&config.solution_layer);
    let id = document.place_instance(definition, transform, layer)?;
    if mirror.0 || mirror.1 {
        document.set_entity_attribute(&id, ISG_DICTIONARY, "mirrored_x", mirror.0)?;
        document.set_entity_attribute(&id, ISG_DICTIONARY, "mirrored_y", mirror.1)?;
    }
    Ok(id)
}

fn list_entities(document: &Document) -> Result<()> {
    let mut ids = document.entity_ids();
    ids.sort();
    for id in ids {
        let definition = document.definition_of(&id)?;
        let kind = if definition.is_marker() { "marker" } else { "shape" };
        let uid = document
            .entity_attribute(&id, ISG_DICTIONARY, "UID")
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        let position = if definition.is_marker() {
            document.world_points(&id)?.first().copied().unwrap_or_else(Point2::origin)
        } else {
            document.world_bounds(&id)?.center()
        };
        println!(
            "{:>6}  {:<6}  {:<32}  {:<20}  {:<24}  ({:.4}, {:.4})",
            id.to_string(),
            kind,
            uid,
            document.layer_name(&id).unwrap_or("?"),
            definition.name,
            position.x,
            position.y
        );
    }
    Ok(())
}

fn print_summary(controller: &Controller) {
    let registry = controller.session().registry();
    println!("boundary: {}", controller.boundary());
    println!("shapes:   {}", registry.shapes().len());
    println!("markers:  {}", registry.markers().len());
    println!("solution: {}", registry.solution().len());
    println!("rules:    {}", controller.rules().len());
}

fn print_rules(controller: &Controller) {
    if controller.rules().is_empty() {
        println!("no rules defined");
        return;
    }
    for (id, rule) in controller.rules() {
        println!("{:<24}  {:<8}  {}", id, rule.kind_name(), rule.record().summary());
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    match &cli.command {
        Command::New { boundary } => create_workspace(&cli, &config, boundary.as_deref())?,

        Command::AddDefinition { name, points, sort } => {
            let mut document = open_document(&cli)?;
            add_definition(&mut document, name, points.as_deref(), *sort)?;
            document.save()?;
            println!("added definition '{name}'");
        }

        Command::Place {
            definition,
            at,
            layer,
            mirror_x,
            mirror_y,
        } => {
            let mut document = open_document(&cli)?;
            let id = place(
                &mut document,
                &config,
                definition,
                parse_point(at)?,
                layer.as_deref(),
                (*mirror_x, *mirror_y),
            )?;
            document.save()?;
            println!("{id}");
        }

        Command::List => list_entities(&open_document(&cli)?)?,

        Command::Init { boundary } => {
            let boundary = boundary.as_deref().map(parse_entity_id).transpose()?;
            let mut controller = open_controller(&cli, config, boundary)?;
            controller.save()?;
            print_summary(&controller);
        }

        Command::PickOriginal { ids } => {
            let mut controller = open_controller(&cli, config, None)?;
            let pick = controller.pick_original_shape(&parse_entity_ids(ids)?)?;
            controller.save()?;
            println!("picked origin {} and {} original shapes", pick.origin, pick.shapes.len());
        }

        Command::PickNew { ids } => {
            let mut controller = open_controller(&cli, config, None)?;
            let pick = controller.pick_new_shape(&parse_entity_ids(ids)?)?;
            controller.save()?;
            println!("picked origin {} and {} new shapes", pick.origin, pick.shapes.len());
        }

        Command::DefineReplace {
            name,
            mirror_x,
            mirror_y,
            disable_overlap,
            overwrite,
        } => {
            let mut controller = open_controller(&cli, config, None)?;
            let options = ReplaceOptions {
                mirror_x: *mirror_x,
                mirror_y: *mirror_y,
                disable_overlap: *disable_overlap,
            };
            let id = controller.define_replace_rule(name.as_deref(), options, *overwrite)?;
            controller.save()?;
            println!("defined replace rule '{id}'");
        }

        Command::DefineMerge {
            name,
            merge_x,
            merge_y,
            count,
            definitions,
            max_distance,
            overwrite,
        } => {
            let mut controller = open_controller(&cli, config, None)?;
            let options = MergeOptions {
                merge_x: *merge_x,
                merge_y: *merge_y,
                num_objects: *count,
                definitions: parse_names(definitions),
                max_distance: *max_distance,
            };
            let id = controller.define_merge_rule(name.as_deref(), options, *overwrite)?;
            controller.save()?;
            println!("defined merge rule '{id}'");
        }

        Command::DefineStretch {
            name,
            stretch_x,
            stretch_y,
            min,
            max,
            definitions,
            constrain_connecting,
            overwrite,
        } => {
            let mut controller = open_controller(&cli, config, None)?;
            let options = StretchOptions {
                stretch_x: *stretch_x,
                stretch_y: *stretch_y,
                min_stretch: *min,
                max_stretch: *max,
                definitions: parse_names(definitions),
                constrain_connecting: *constrain_connecting,
            };
            let id = controller.define_stretch_rule(name.as_deref(), options, *overwrite)?;
            controller.save()?;
            println!("defined stretch rule '{id}'");
        }

        Command::Rules => {
            let controller = open_controller(&cli, config, None)?;
            print_rules(&controller);
        }

        Command::Generate { count, rules, timeout } => {
            let count = count.unwrap_or(config.default_iterations);
            let timeout = timeout.map(Duration::from_secs).unwrap_or(config.default_timeout());
            let mut controller = open_controller(&cli, config, None)?;

            let requested = rules.as_deref().map(parse_names).unwrap_or_default();
            let selected: Vec<String> = if requested.is_empty() {
                controller.rules().keys().cloned().collect()
            } else {
                requested
                    .into_iter()
                    .filter(|name| {
                        let known = controller.rules().contains_key(name);
                        if !known {
                            warn!("Ignoring unknown rule '{}'", name);
                        }
                        known
                    })
                    .collect()
            };
            if selected.is_empty() {
                bail!("no rules to apply");
            }

            let report = controller.generate_design(count, &selected, timeout)?;
            controller.save()?;
            if !report.completed() {
                warn!("Generation stopped early: {:?}", report.stop);
            }
            println!("{report}");
        }

        Command::Apply {
            rule,
            ids,
            factor_x,
            factor_y,
        } => {
            let mut controller = open_controller(&cli, config, None)?;
            let outcome =
                controller.apply_rule_to_selection(rule, &parse_entity_ids(ids)?, (*factor_x, *factor_y))?;
            controller.save()?;
            match outcome {
                ApplyOutcome::Applied(shapes) => {
                    let shapes: Vec<String> = shapes.iter().map(|id| id.to_string()).collect();
                    println!("applied '{rule}': {}", shapes.join(" "));
                }
                ApplyOutcome::NoOp => println!("'{rule}' produced no new shapes"),
                ApplyOutcome::Rejected(reason) => println!("'{rule}' was rejected: {reason:?}"),
            }
        }

        Command::Undo { id } => {
            let mut controller = open_controller(&cli, config, None)?;
            let restored = controller.undo_rule(&parse_entity_id(id)?)?;
            controller.save()?;
            println!("restored {} shapes", restored.len());
        }

        Command::Reset => {
            let mut controller = open_controller(&cli, config, None)?;
            let removed = controller.reset()?;
            controller.save()?;
            println!("removed {removed} shapes");
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .finish(),
    )?;

    run(cli)
}
