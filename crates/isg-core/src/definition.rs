//! 多边形定义
//!
//! 定义是一组面（外环顶点）在其自身坐标系中的描述，可以被多次放置。
//! 没有面的定义只提供一个基点，作为规则的原点标记使用。

use crate::math::Point2;
use crate::properties::Color;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 面：一条有序的外环
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Face {
    /// 外环顶点（定义坐标）
    pub outer_loop: Vec<Point2>,
    /// 面材质
    pub material: Color,
    /// 边材质
    pub edge_material: Color,
}

impl Face {
    pub fn new(outer_loop: Vec<Point2>) -> Self {
        Self {
            outer_loop,
            material: Color::default(),
            edge_material: Color::BLACK,
        }
    }

    /// 设置材质
    pub fn with_materials(mut self, material: Color, edge_material: Color) -> Self {
        self.material = material;
        self.edge_material = edge_material;
        self
    }
}

/// 多边形定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Definition {
    /// 定义名称（必须唯一）
    pub name: String,
    /// 基点（标记的世界位置即变换后的基点）
    pub base_point: Point2,
    /// 定义中的面
    pub faces: Vec<Face>,
}

impl Definition {
    /// 创建空定义
    pub fn new(name: impl Into<String>, base_point: Point2) -> Self {
        Self {
            name: name.into(),
            base_point,
            faces: Vec::new(),
        }
    }

    /// 只有一个面的定义
    pub fn polygon(name: impl Into<String>, outer_loop: Vec<Point2>) -> Self {
        let mut def = Self::new(name, Point2::origin());
        def.faces.push(Face::new(outer_loop));
        def
    }

    /// 以原点为左下角的矩形
    pub fn rectangle(name: impl Into<String>, width: f64, height: f64) -> Self {
        Self::polygon(
            name,
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(width, 0.0),
                Point2::new(width, height),
                Point2::new(0.0, height),
            ],
        )
    }

    /// 以原点为中心的矩形
    pub fn centered_rectangle(name: impl Into<String>, width: f64, height: f64) -> Self {
        let (hw, hh) = (width / 2.0, height / 2.0);
        Self::polygon(
            name,
            vec![
                Point2::new(-hw, -hh),
                Point2::new(hw, -hh),
                Point2::new(hw, hh),
                Point2::new(-hw, hh),
            ],
        )
    }

    /// 原点标记（无面）
    pub fn marker(name: impl Into<String>) -> Self {
        Self::new(name, Point2::origin())
    }

    /// 添加面
    pub fn add_face(&mut self, face: Face) {
        self.faces.push(face);
    }

    /// 没有面即为标记
    pub fn is_marker(&self) -> bool {
        self.faces.is_empty()
    }

    /// 所有面的顶点，去重后按首次出现的顺序返回
    ///
    /// 标记返回它的基点。
    pub fn vertices(&self) -> Vec<Point2> {
        if self.is_marker() {
            return vec![self.base_point];
        }
        let mut out: Vec<Point2> = Vec::new();
        for p in self.faces.iter().flat_map(|f| f.outer_loop.iter()) {
            if !out.contains(p) {
                out.push(*p);
            }
        }
        out
    }
}

/// 定义表 - 管理所有定义
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefinitionTable {
    /// 定义（按名称索引）
    definitions: HashMap<String, Definition>,
}

impl DefinitionTable {
    /// 创建空的定义表
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加定义；名称重复时返回 false
    pub fn add(&mut self, definition: Definition) -> bool {
        if self.definitions.contains_key(&definition.name) {
            false
        } else {
            self.definitions
                .insert(definition.name.clone(), definition);
            true
        }
    }

    /// 获取定义
    pub fn get(&self, name: &str) -> Option<&Definition> {
        self.definitions.get(name)
    }

    /// 移除定义
    pub fn remove(&mut self, name: &str) -> Option<Definition> {
        self.definitions.remove(name)
    }

    /// 检查定义是否存在
    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// 以 `prefix` 开头的第一个未被占用的名称（`prefix#1`、`prefix#2`…）
    pub fn unique_name(&self, prefix: &str) -> String {
        (1..)
            .map(|n| format!("{prefix}#{n}"))
            .find(|name| !self.contains(name))
            .unwrap_or_else(|| prefix.to_string())
    }

    /// 获取定义数量
    pub fn count(&self) -> usize {
        self.definitions.len()
    }

    /// 迭代所有定义
    pub fn iter(&self) -> impl Iterator<Item = &Definition> {
        self.definitions.values()
    }
}
