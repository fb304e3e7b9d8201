//! 绑定边界的几何查询
//!
//! 边界在初始化时确定，之后所有的包含判断都针对它进行。
//! 其余查询只读取注册表中的缓存坐标，不访问场景。

use crate::error::EngineError;
use crate::registry::{Registry, ShapeState};
use isg_core::definition::{Definition, Face};
use isg_core::entity::EntityId;
use isg_core::math::{snap_point, BoundingBox2, Point2, Vector2, COORD_QUANTUM};
use isg_core::polygon::{convex_hull, convex_polygons_overlap, point_in_polygon_2d};
use isg_core::properties::Color;
use isg_core::transform::Transform2D;
use isg_file::Document;
use serde::{Deserialize, Serialize};

/// 坐标轴方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    /// 正方向单位向量
    pub fn vector(&self) -> Vector2 {
        match self {
            Axis::X => Vector2::new(1.0, 0.0),
            Axis::Y => Vector2::new(0.0, 1.0),
        }
    }

    fn component(&self, p: &Point2) -> f64 {
        match self {
            Axis::X => p.x,
            Axis::Y => p.y,
        }
    }
}

/// 边界几何
#[derive(Debug, Clone)]
pub struct Geometry {
    /// 边界面的世界坐标外环
    boundary: Vec<Point2>,
}

impl Geometry {
    /// 从场景中的边界实体初始化
    ///
    /// 边界实体必须恰好有一个面。
    pub fn initialize(document: &Document, boundary: &EntityId) -> Result<Self, EngineError> {
        let faces = document.world_faces(boundary)?;
        if faces.len() != 1 {
            return Err(EngineError::InvalidBoundary(faces.len()));
        }
        let outer: Vec<Point2> = faces[0].iter().map(snap_point).collect();
        Ok(Self::from_loop(outer))
    }

    /// 直接从外环构造
    pub fn from_loop(boundary: Vec<Point2>) -> Self {
        Self { boundary }
    }

    pub fn boundary(&self) -> &[Point2] {
        &self.boundary
    }

    /// 形状是否完全位于边界内（落在边上也算）
    pub fn inside_boundary(&self, center: &Point2, points: &[Point2]) -> bool {
        point_in_polygon_2d(center, &self.boundary, true)
            && points
                .iter()
                .all(|p| point_in_polygon_2d(p, &self.boundary, true))
    }

    /// 状态是否位于边界内
    pub fn state_inside(&self, state: &ShapeState) -> bool {
        self.inside_boundary(&state.position, &state.points)
    }

    /// 解集合中是否有形状与给定点集的凸包重叠
    ///
    /// 只有内部相交才算重叠，`exclude` 中的形状不参与比较。
    pub fn overlaps_solution(registry: &Registry, points: &[Point2], exclude: &[EntityId]) -> bool {
        let hull = convex_hull(points);
        registry
            .solution()
            .iter()
            .filter(|id| !exclude.contains(id))
            .filter_map(|id| registry.state(id))
            .any(|other| convex_polygons_overlap(&hull, &convex_hull(&other.points)))
    }
}

/// 两个形状是否相同
///
/// 位置必须完全相等；在此基础上，同一定义且同一变换即为相同，
/// 否则要求顶点集合之间存在一一对应。
pub fn identical(a: &ShapeState, b: &ShapeState) -> bool {
    if a.position != b.position {
        return false;
    }
    if a.definition == b.definition && a.transform == b.transform {
        return true;
    }
    if a.points.len() != b.points.len() {
        return false;
    }
    let mut unmatched: Vec<&Point2> = b.points.iter().collect();
    for p in &a.points {
        match unmatched.iter().position(|q| *q == p) {
            Some(i) => {
                unmatched.swap_remove(i);
            }
            None => return false,
        }
    }
    true
}

/// 按到 `id` 的距离升序排列的其他解形状
pub fn sort_by_distance(registry: &Registry, id: &EntityId) -> Vec<EntityId> {
    let Some(origin) = registry.state(id).map(|s| s.position) else {
        return Vec::new();
    };
    let mut others: Vec<(f64, EntityId)> = registry
        .solution()
        .iter()
        .filter(|other| *other != id)
        .filter_map(|other| {
            registry
                .state(other)
                .map(|s| ((s.position - origin).norm(), *other))
        })
        .collect();
    others.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    others.into_iter().map(|(_, other)| other).collect()
}

/// 距离最近的 `n` 个形状
pub fn get_closest(registry: &Registry, id: &EntityId, n: usize) -> Vec<EntityId> {
    sort_by_distance(registry, id).into_iter().take(n).collect()
}

/// 候选中与 `id` 相距 `distance` 且方向与 `vector` 一致的形状
///
/// 距离比较允许坐标量化带来的误差；方向要求同向平行。
pub fn get_by_distance(
    registry: &Registry,
    id: &EntityId,
    candidates: &[EntityId],
    distance: f64,
    vector: &Vector2,
) -> Vec<EntityId> {
    let Some(origin) = registry.state(id).map(|s| s.position) else {
        return Vec::new();
    };
    let tolerance = COORD_QUANTUM * 16.0 * distance.abs().max(1.0);
    let direction_norm = vector.norm();

    candidates
        .iter()
        .filter(|c| *c != id)
        .filter(|c| {
            let Some(state) = registry.state(c) else {
                return false;
            };
            let offset = state.position - origin;
            let length = offset.norm();
            if (length - distance).abs() > tolerance {
                return false;
            }
            if length == 0.0 || direction_norm == 0.0 {
                return length == 0.0 && direction_norm == 0.0;
            }
            let along = offset.dot(vector) / (length * direction_norm);
            (along - 1.0).abs() <= 1e-6
        })
        .copied()
        .collect()
}

/// 沿方向射线步进，依次收集被击中的候选形状
///
/// 从 `id` 的位置出发，每步前进 `max_distance / steps`。
/// 击中的点落在某个解形状凸包内（含边）即视为击中；击中非候选形状时放弃，
/// 返回空列表。收集到 `count` 个后提前结束。
pub fn collect_in_direction(
    registry: &Registry,
    id: &EntityId,
    candidates: &[EntityId],
    count: usize,
    vector: &Vector2,
    max_distance: f64,
    steps: usize,
) -> Vec<EntityId> {
    let Some(origin) = registry.state(id).map(|s| s.position) else {
        return Vec::new();
    };
    let length = vector.norm();
    if count == 0 || steps == 0 || length == 0.0 || max_distance <= 0.0 {
        return Vec::new();
    }
    let direction = vector / length;
    let step = max_distance / steps as f64;

    let hulls: Vec<(EntityId, Vec<Point2>)> = registry
        .solution()
        .iter()
        .filter(|other| *other != id)
        .filter_map(|other| registry.state(other).map(|s| (*other, convex_hull(&s.points))))
        .collect();

    let mut hits: Vec<EntityId> = Vec::new();
    for i in 1..=steps {
        let probe = origin + direction * (step * i as f64);
        for (other, hull) in &hulls {
            if hits.contains(other) || !point_in_polygon_2d(&probe, hull, true) {
                continue;
            }
            if !candidates.contains(other) {
                return Vec::new();
            }
            hits.push(*other);
            if hits.len() == count {
                return hits;
            }
        }
    }
    hits
}

/// 将形状沿坐标轴按位置升序排序
pub fn sort_components_in_direction(registry: &Registry, ids: &[EntityId], axis: Axis) -> Vec<EntityId> {
    let mut keyed: Vec<(f64, EntityId)> = ids
        .iter()
        .filter_map(|id| registry.state(id).map(|s| (axis.component(&s.position), *id)))
        .collect();
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    keyed.into_iter().map(|(_, id)| id).collect()
}

/// 以无序点集的凸包创建一个新定义并放置其实例
///
/// 定义坐标相对于凸包包围盒的左下角，实例放置在该角点处，
/// 因此实例的世界坐标与输入点重合。
pub fn add_face_in_component(
    document: &mut Document,
    name: &str,
    points: &[Point2],
    face_color: Color,
    edge_color: Color,
    layer: &str,
) -> Result<EntityId, EngineError> {
    let hull = convex_hull(points);
    if hull.len() < 3 {
        return Err(EngineError::selection("merged points do not span a face"));
    }
    let origin = BoundingBox2::from_points(&hull).min;
    let outer_loop: Vec<Point2> = hull
        .iter()
        .map(|p| snap_point(&Point2::from(p - origin)))
        .collect();

    let mut definition = Definition::new(name, Point2::origin());
    definition.add_face(Face::new(outer_loop).with_materials(face_color, edge_color));
    document.add_definition(definition)?;

    Ok(document.place_instance(name, Transform2D::translation(origin.x, origin.y), layer)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EntityKind;
    use crate::uid::Uid;
    use std::collections::BTreeSet;

    fn square_state(uid: &str, x: f64, y: f64) -> ShapeState {
        ShapeState {
            uid: Uid::from(uid),
            kind: EntityKind::Shape,
            definition: "Square".to_string(),
            position: Point2::new(x + 0.5, y + 0.5),
            points: vec![
                Point2::new(x, y),
                Point2::new(x + 1.0, y),
                Point2::new(x + 1.0, y + 1.0),
                Point2::new(x, y + 1.0),
            ],
            transform: [1.0, 0.0, x, 0.0, 1.0, y],
            rules_applied: BTreeSet::new(),
            mirrored_x: false,
            mirrored_y: false,
            applied_by_rule: None,
            erased_entities: Vec::new(),
        }
    }

    fn row_of_squares(n: usize) -> (Registry, Vec<EntityId>) {
        let mut registry = Registry::new();
        let ids: Vec<EntityId> = (0..n)
            .map(|i| {
                let id = EntityId::new();
                registry.insert(id, square_state(&format!("s{i}"), i as f64, 0.0));
                registry.add_to_solution(id);
                id
            })
            .collect();
        (registry, ids)
    }

    #[test]
    fn test_inside_boundary_includes_edges() {
        let geometry = Geometry::from_loop(square_state("b", 0.0, 0.0).points);
        let inside = square_state("a", 0.0, 0.0);
        let outside = square_state("c", 0.5, 0.0);

        assert!(geometry.state_inside(&inside));
        assert!(!geometry.state_inside(&outside));
    }

    #[test]
    fn test_single_vertex_outside_fails_containment() {
        let geometry = Geometry::from_loop(square_state("b", 0.0, 0.0).points);
        let shape = square_state("a", 0.0, 0.0);
        assert!(geometry.state_inside(&shape));

        let outward = [(-0.1, -0.1), (0.1, -0.1), (0.1, 0.1), (-0.1, 0.1)];
        for (i, (dx, dy)) in outward.iter().enumerate() {
            let mut moved = shape.clone();
            moved.points[i] += Vector2::new(*dx, *dy);
            assert!(!geometry.state_inside(&moved), "vertex {i}");
        }
    }

    #[test]
    fn test_identical_by_vertices() {
        let a = square_state("a", 0.0, 0.0);
        let mut b = square_state("b", 0.0, 0.0);
        b.definition = "Other".to_string();
        b.points.reverse();
        assert!(identical(&a, &b));

        b.points[0] = Point2::new(0.0, 0.25);
        assert!(!identical(&a, &b));
        assert!(!identical(&a, &square_state("c", 1.0, 0.0)));
    }

    #[test]
    fn test_sort_by_distance_and_closest() {
        let (registry, ids) = row_of_squares(4);
        assert_eq!(sort_by_distance(&registry, &ids[2]), vec![ids[1], ids[3], ids[0]]);
        assert_eq!(get_closest(&registry, &ids[0], 2), vec![ids[1], ids[2]]);
    }

    #[test]
    fn test_get_by_distance_requires_direction() {
        let (registry, ids) = row_of_squares(3);
        let right = Vector2::new(1.0, 0.0);

        assert_eq!(get_by_distance(&registry, &ids[1], &ids, 1.0, &right), vec![ids[2]]);
        assert_eq!(get_by_distance(&registry, &ids[1], &ids, 1.0, &-right), vec![ids[0]]);
        assert!(get_by_distance(&registry, &ids[1], &ids, 2.0, &right).is_empty());
    }

    #[test]
    fn test_collect_in_direction() {
        let (registry, ids) = row_of_squares(3);
        let x = Axis::X.vector();

        let hits = collect_in_direction(&registry, &ids[0], &ids, 2, &x, 2.0, 512);
        assert_eq!(hits, vec![ids[1], ids[2]]);

        // 途中击中非候选形状
        let hits = collect_in_direction(&registry, &ids[0], &[ids[2]], 1, &x, 2.0, 512);
        assert!(hits.is_empty());

        let hits = collect_in_direction(&registry, &ids[2], &ids, 1, &x, 2.0, 512);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_sort_components_in_direction() {
        let (registry, ids) = row_of_squares(3);
        let shuffled = vec![ids[2], ids[0], ids[1]];
        assert_eq!(sort_components_in_direction(&registry, &shuffled, Axis::X), ids);
    }

    #[test]
    fn test_overlaps_solution() {
        let (registry, ids) = row_of_squares(2);
        let probe = square_state("p", 0.5, 0.0).points;

        assert!(Geometry::overlaps_solution(&registry, &probe, &[]));
        assert!(!Geometry::overlaps_solution(&registry, &square_state("q", 2.0, 0.0).points, &[]));
        assert!(!Geometry::overlaps_solution(&registry, &probe, &ids));
    }

    #[test]
    fn test_add_face_in_component() {
        let mut doc = Document::new();
        let points = vec![
            Point2::new(3.0, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 2.0),
            Point2::new(3.0, 2.0),
            Point2::new(2.0, 1.5),
        ];
        let id = add_face_in_component(&mut doc, "Merged#1", &points, Color::MERGED_FACE, Color::BLACK, "SG Solution Layer")
            .unwrap();

        let world = doc.world_points(&id).unwrap();
        assert_eq!(world.len(), 4);
        assert!(world.contains(&Point2::new(1.0, 1.0)));
        assert!(world.contains(&Point2::new(3.0, 2.0)));
        assert_eq!(doc.definition("Merged#1").unwrap().faces[0].material, Color::MERGED_FACE);
    }
}
