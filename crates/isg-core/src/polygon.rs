//! 平面多边形谓词与构造
//!
//! 只考虑 x/y 两个坐标。这里的函数都是无状态的纯函数。

use crate::math::{cross, Point2, Vector2, COORD_QUANTUM};
use std::cmp::Ordering;

/// 点是否在多边形内
///
/// `inclusive` 为真时，落在边或顶点上的点也视为在内。
/// 多边形可以是任意简单多边形，顶点顺序不限。
pub fn point_in_polygon_2d(point: &Point2, polygon: &[Point2], inclusive: bool) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let n = polygon.len();
    for i in 0..n {
        if on_segment(point, &polygon[i], &polygon[(i + 1) % n]) {
            return inclusive;
        }
    }

    // 射线法
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (pi, pj) = (&polygon[i], &polygon[j]);
        if (pi.y > point.y) != (pj.y > point.y) {
            let x_cross = (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x;
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// 点是否落在线段上（含端点）
fn on_segment(p: &Point2, a: &Point2, b: &Point2) -> bool {
    let ab = b - a;
    let ap = p - a;
    if cross(&ab, &ap).abs() > COORD_QUANTUM * ab.norm().max(1.0) {
        return false;
    }
    let dot = ap.dot(&ab);
    dot >= -COORD_QUANTUM && dot <= ab.norm_squared() + COORD_QUANTUM
}

/// 字典序比较：先 x 后 y
fn lexicographic(a: &Point2, b: &Point2) -> Ordering {
    a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y))
}

/// 单调链凸包
///
/// 按 x、y 排序后分别构造下链和上链，非左转的点被丢弃，因此共线点不会出现在结果中。
/// 结果按逆时针排列；少于三个不同点时原样（去重后）返回。
pub fn convex_hull(points: &[Point2]) -> Vec<Point2> {
    let mut pts: Vec<Point2> = points.to_vec();
    pts.sort_by(lexicographic);
    pts.dedup();

    if pts.len() < 3 {
        return pts;
    }

    let turn = |o: &Point2, a: &Point2, b: &Point2| cross(&(a - o), &(b - o));

    let mut lower: Vec<Point2> = Vec::with_capacity(pts.len());
    for p in &pts {
        while lower.len() >= 2 && turn(&lower[lower.len() - 2], &lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(*p);
    }

    let mut upper: Vec<Point2> = Vec::with_capacity(pts.len());
    for p in pts.iter().rev() {
        while upper.len() >= 2 && turn(&upper[upper.len() - 2], &upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(*p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// 绕质心按极角逆时针排序顶点
///
/// 对凸多边形（以及相对质心星形的多边形）得到一个有效的外环。
pub fn sort_vertices(points: &[Point2]) -> Vec<Point2> {
    if points.is_empty() {
        return Vec::new();
    }
    let n = points.len() as f64;
    let centroid = Point2::new(
        points.iter().map(|p| p.x).sum::<f64>() / n,
        points.iter().map(|p| p.y).sum::<f64>() / n,
    );
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| {
        let aa = (a.y - centroid.y).atan2(a.x - centroid.x);
        let ab = (b.y - centroid.y).atan2(b.x - centroid.x);
        aa.total_cmp(&ab).then(lexicographic(a, b))
    });
    sorted
}

/// 将凸多边形投影到轴上
fn project(polygon: &[Point2], axis: &Vector2) -> (f64, f64) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for p in polygon {
        let d = p.coords.dot(axis);
        lo = lo.min(d);
        hi = hi.max(d);
    }
    (lo, hi)
}

/// 两个凸多边形的内部是否重叠（分离轴定理）
///
/// 共边或共点的接触不算重叠，与含边界的包含判断保持一致。
/// 退化多边形（少于三个顶点）没有内部，永远不重叠。结果与参数顺序无关。
pub fn convex_polygons_overlap(a: &[Point2], b: &[Point2]) -> bool {
    if a.len() < 3 || b.len() < 3 {
        return false;
    }
    for polygon in [a, b] {
        let n = polygon.len();
        for i in 0..n {
            let edge = polygon[(i + 1) % n] - polygon[i];
            let axis = Vector2::new(-edge.y, edge.x);
            let length = axis.norm();
            if length == 0.0 {
                continue;
            }
            let axis = axis / length;
            let (min_a, max_a) = project(a, &axis);
            let (min_b, max_b) = project(b, &axis);
            if max_a <= min_b + COORD_QUANTUM || max_b <= min_a + COORD_QUANTUM {
                return false;
            }
        }
    }
    true
}
