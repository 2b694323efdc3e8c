//! Force-directed layout of the note graph.
//!
//! A fixed number of simulation steps over a bounded surface: pairwise
//! inverse-square repulsion, linear spring attraction along edges and a weak
//! pull toward the centre, all scaled by a linear cooling factor. The
//! computation is pure and deterministic; [`spawn_layout`] moves it onto the
//! blocking pool for async callers.

use std::collections::HashMap;
use std::f64::consts::TAU;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::graph::{Edge, Node};

/// Drawing area in surface units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Surface {
    pub width: f64,
    pub height: f64,
}

impl Surface {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Non-positive or non-finite dimensions become 1.0.
    fn sanitized(self) -> Self {
        let fix = |d: f64| if d.is_finite() && d > 0.0 { d } else { 1.0 };
        Self {
            width: fix(self.width),
            height: fix(self.height),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutParams {
    pub iterations: usize,
    /// Repulsion constant, force `k / d²`.
    pub repulsion: f64,
    /// Spring divisor, force `d / k`.
    pub attraction: f64,
    /// Centering strength, scaled by offset over surface dimension.
    pub gravity: f64,
    /// Velocity retained after each step.
    pub damping: f64,
    /// Minimum distance kept from every surface edge.
    pub margin: f64,
    /// Initial circle radius as a fraction of the smaller dimension.
    pub initial_radius: f64,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            iterations: 120,
            repulsion: 2800.0,
            attraction: 80.0,
            gravity: 0.4,
            damping: 0.6,
            margin: 30.0,
            initial_radius: 0.3,
        }
    }
}

/// A positioned node, ready for drawing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutPoint {
    pub id: String,
    pub title: String,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub degree: usize,
}

impl LayoutPoint {
    /// Drawing radius: grows with degree, capped at 20.
    pub fn radius(&self) -> f64 {
        6.0 + (self.degree as f64 * 3.0).min(14.0)
    }
}

/// Lay out `nodes` on a `width × height` surface with default constants.
pub fn layout(
    nodes: &[Node],
    edges: &[Edge],
    width: f64,
    height: f64,
    iterations: usize,
) -> Vec<LayoutPoint> {
    let params = LayoutParams {
        iterations,
        ..LayoutParams::default()
    };
    layout_with(nodes, edges, Surface::new(width, height), &params)
}

/// Lay out `nodes` with explicit constants.
///
/// Output order matches `nodes`. Edges naming an id absent from `nodes` are
/// ignored; when an id appears twice the first occurrence is the one edges
/// attach to.
pub fn layout_with(
    nodes: &[Node],
    edges: &[Edge],
    surface: Surface,
    params: &LayoutParams,
) -> Vec<LayoutPoint> {
    if nodes.is_empty() {
        return Vec::new();
    }

    let surface = surface.sanitized();
    let mut points = initial_circle(nodes, surface, params.initial_radius);

    let mut index: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        index.entry(node.id.as_str()).or_insert(i);
    }

    for edge in edges {
        for end in [&edge.source, &edge.target] {
            if let Some(&i) = index.get(end.as_str()) {
                points[i].degree += 1;
            }
        }
    }

    let springs: Vec<(usize, usize)> = edges
        .iter()
        .filter_map(|e| Some((*index.get(e.source.as_str())?, *index.get(e.target.as_str())?)))
        .collect();

    let x_range = axis_range(surface.width, params.margin);
    let y_range = axis_range(surface.height, params.margin);

    for iter in 0..params.iterations {
        let cooling = 1.0 - iter as f64 / params.iterations as f64;
        apply_repulsion(&mut points, params.repulsion, cooling);
        apply_attraction(&mut points, &springs, params.attraction, cooling);
        apply_centering(&mut points, surface, params.gravity, cooling);
        integrate(&mut points, x_range, y_range, params.damping);
    }

    points
}

/// Run [`layout_with`] on tokio's blocking pool.
///
/// Must be called from within a tokio runtime.
pub fn spawn_layout(
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    surface: Surface,
    params: LayoutParams,
) -> JoinHandle<Vec<LayoutPoint>> {
    tokio::task::spawn_blocking(move || layout_with(&nodes, &edges, surface, &params))
}

// ── Simulation steps ──────────────────────────────────────────────────────────

fn initial_circle(nodes: &[Node], surface: Surface, radius_frac: f64) -> Vec<LayoutPoint> {
    let (cx, cy) = (surface.width / 2.0, surface.height / 2.0);
    let radius = surface.width.min(surface.height) * radius_frac;
    let n = nodes.len() as f64;

    nodes
        .iter()
        .enumerate()
        .map(|(i, node)| {
            let angle = TAU * i as f64 / n;
            LayoutPoint {
                id: node.id.clone(),
                title: node.title.clone(),
                x: cx + radius * angle.cos(),
                y: cy + radius * angle.sin(),
                vx: 0.0,
                vy: 0.0,
                degree: 0,
            }
        })
        .collect()
}

/// Allowed coordinate range on one axis. Too narrow for two margins: the centre line.
fn axis_range(dimension: f64, margin: f64) -> (f64, f64) {
    if dimension >= 2.0 * margin {
        (margin, dimension - margin)
    } else {
        (dimension / 2.0, dimension / 2.0)
    }
}

/// Unit vector from `b` to `a` and the distance, floored at 1.0.
fn direction(ax: f64, ay: f64, bx: f64, by: f64) -> (f64, f64, f64) {
    let (dx, dy) = (ax - bx, ay - by);
    let dist = dx.hypot(dy).max(1.0);
    (dx / dist, dy / dist, dist)
}

fn apply_repulsion(points: &mut [LayoutPoint], k: f64, cooling: f64) {
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            let (ux, uy, dist) = direction(points[i].x, points[i].y, points[j].x, points[j].y);
            let force = k / (dist * dist) * cooling;
            points[i].vx += ux * force;
            points[i].vy += uy * force;
            points[j].vx -= ux * force;
            points[j].vy -= uy * force;
        }
    }
}

fn apply_attraction(points: &mut [LayoutPoint], springs: &[(usize, usize)], k: f64, cooling: f64) {
    for &(s, t) in springs {
        let (ux, uy, dist) = direction(points[t].x, points[t].y, points[s].x, points[s].y);
        let force = dist / k * cooling;
        points[s].vx += ux * force;
        points[s].vy += uy * force;
        points[t].vx -= ux * force;
        points[t].vy -= uy * force;
    }
}

fn apply_centering(points: &mut [LayoutPoint], surface: Surface, gravity: f64, cooling: f64) {
    let (cx, cy) = (surface.width / 2.0, surface.height / 2.0);
    for p in points {
        p.vx += (cx - p.x) / surface.width * gravity * cooling;
        p.vy += (cy - p.y) / surface.height * gravity * cooling;
    }
}

fn integrate(points: &mut [LayoutPoint], x_range: (f64, f64), y_range: (f64, f64), damping: f64) {
    for p in points {
        p.x = (p.x + p.vx).clamp(x_range.0, x_range.1);
        p.y = (p.y + p.vy).clamp(y_range.0, y_range.1);
        p.vx *= damping;
        p.vy *= damping;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> Node {
        Node {
            id: id.to_string(),
            title: id.to_uppercase(),
            content_hash: String::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    fn edge(source: &str, target: &str) -> Edge {
        Edge {
            source: source.to_string(),
            target: target.to_string(),
        }
    }

    #[test]
    fn empty_graph_yields_empty_layout() {
        assert!(layout(&[], &[], 800.0, 600.0, 120).is_empty());
    }

    #[test]
    fn zero_iterations_returns_initial_circle() {
        let points = layout(&[node("a"), node("b")], &[], 800.0, 600.0, 0);
        // Radius 0.3 × 600 around (400, 300): first node at angle 0, second at π.
        assert!((points[0].x - 580.0).abs() < 1e-9);
        assert!((points[0].y - 300.0).abs() < 1e-9);
        assert!((points[1].x - 220.0).abs() < 1e-9);
        assert_eq!(points[0].vx, 0.0);
    }

    #[test]
    fn degree_counts_each_known_endpoint() {
        let nodes = [node("a"), node("b"), node("c")];
        let edges = [edge("a", "b"), edge("a", "c"), edge("a", "ghost"), edge("c", "c")];
        let points = layout(&nodes, &edges, 800.0, 600.0, 1);
        assert_eq!(points[0].degree, 3);
        assert_eq!(points[1].degree, 1);
        assert_eq!(points[2].degree, 3);
    }

    #[test]
    fn radius_grows_with_degree_and_caps() {
        let mut p = layout(&[node("a")], &[], 800.0, 600.0, 0).remove(0);
        assert_eq!(p.radius(), 6.0);
        p.degree = 2;
        assert_eq!(p.radius(), 12.0);
        p.degree = 40;
        assert_eq!(p.radius(), 20.0);
    }

    #[test]
    fn axis_range_collapses_on_narrow_surface() {
        assert_eq!(axis_range(800.0, 30.0), (30.0, 770.0));
        assert_eq!(axis_range(40.0, 30.0), (20.0, 20.0));
    }

    #[test]
    fn degenerate_surface_keeps_points_finite() {
        let points = layout(&[node("a"), node("b")], &[edge("a", "b")], 0.0, -5.0, 50);
        for p in &points {
            assert!(p.x.is_finite() && p.y.is_finite());
            assert_eq!((p.x, p.y), (0.5, 0.5));
        }
    }
}
