//! 测试用场景构造

use crate::config::EngineConfig;
use crate::controller::Controller;
use crate::geometry::Geometry;
use crate::session::Session;
use isg_core::definition::Definition;
use isg_core::entity::EntityId;
use isg_core::transform::Transform2D;
use isg_file::Document;

pub(crate) struct Fixture {
    pub document: Document,
    pub boundary: EntityId,
    pub config: EngineConfig,
}

impl Fixture {
    /// 4x4 边界
    pub fn new() -> Self {
        Self::with_boundary(4.0, 4.0)
    }

    /// 以原点为左下角的矩形边界，附带常用定义：
    /// `Square`（1x1，左下角为原点）、`Small`（0.2x0.2，中心为原点）、`Origin`（标记）
    pub fn with_boundary(width: f64, height: f64) -> Self {
        let config = EngineConfig::default().with_seed(42);
        let mut document = Document::new();
        document
            .add_definition(Definition::rectangle("Boundary", width, height))
            .unwrap();
        document.add_definition(Definition::rectangle("Square", 1.0, 1.0)).unwrap();
        document
            .add_definition(Definition::centered_rectangle("Small", 0.2, 0.2))
            .unwrap();
        document.add_definition(Definition::marker("Origin")).unwrap();
        let boundary = document
            .place_instance("Boundary", Transform2D::identity(), &config.boundary_layer)
            .unwrap();
        Self {
            document,
            boundary,
            config,
        }
    }

    /// 在解图层放置实例
    pub fn place(&mut self, definition: &str, x: f64, y: f64) -> EntityId {
        let layer = self.config.solution_layer.clone();
        self.place_on(definition, x, y, &layer)
    }

    pub fn place_on(&mut self, definition: &str, x: f64, y: f64, layer: &str) -> EntityId {
        self.document
            .place_instance(definition, Transform2D::translation(x, y), layer)
            .unwrap()
    }

    /// 左下角位于 (x, y) 的单位正方形
    pub fn square_at(&mut self, x: f64, y: f64) -> EntityId {
        self.place("Square", x, y)
    }

    /// 在规则库图层放置实例
    pub fn library(&mut self, definition: &str, x: f64, y: f64) -> EntityId {
        let layer = self.config.rules_layer.clone();
        self.place_on(definition, x, y, &layer)
    }

    pub fn session(self) -> Session {
        let geometry = Geometry::initialize(&self.document, &self.boundary).unwrap();
        Session::new(self.document, geometry, self.config)
    }

    pub fn controller(self) -> Controller {
        Controller::initialize(self.document, None, self.config).unwrap()
    }
}
