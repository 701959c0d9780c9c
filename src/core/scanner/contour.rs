//! Outer-border extraction on a binary mask and polygon simplification.
//!
//! Foreground components are 8-connected, background 4-connected. A component
//! counts as external when it touches the image border or the background that
//! is reachable from the border; components sitting inside a hole of another
//! component are skipped.

use std::collections::VecDeque;

use super::types::{BoundingBox, Point};

/// Clockwise neighbour offsets in image coordinates, starting west.
const NEIGHBOURS: [(isize, isize); 8] = [
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
];

const WEST: usize = 0;

/// Closed outline of one foreground component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contour {
    pub points: Vec<Point>,
}

impl Contour {
    /// Shoelace area of the closed outline.
    pub fn area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let twice: i64 = (0..n)
            .map(|i| {
                let a = self.points[i];
                let b = self.points[(i + 1) % n];
                a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64
            })
            .sum();
        twice.abs() as f64 / 2.0
    }

    /// Closed arc length.
    pub fn perimeter(&self) -> f64 {
        let n = self.points.len();
        if n < 2 {
            return 0.0;
        }
        (0..n)
            .map(|i| distance(self.points[i], self.points[(i + 1) % n]))
            .sum()
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(&self.points)
    }

    /// Douglas-Peucker on the closed outline.
    pub fn approximate(&self, epsilon: f64) -> Vec<Point> {
        approximate_closed(&self.points, epsilon)
    }
}

/// Outer borders of every external component in `mask` (row-major,
/// `width * height`). A mask of the wrong length yields nothing.
pub fn find_external_contours(mask: &[bool], width: usize, height: usize) -> Vec<Contour> {
    if width == 0 || height == 0 || mask.len() != width * height {
        return Vec::new();
    }

    let outside = outer_background(mask, width, height);
    let mut visited = vec![false; mask.len()];
    let mut contours = Vec::new();

    for idx in 0..mask.len() {
        if !mask[idx] || visited[idx] {
            continue;
        }
        // raster order: idx is the top-left-most pixel of its component
        let external = label_component(mask, &outside, &mut visited, width, height, idx);
        if external {
            let start = (idx % width, idx / width);
            let points = trace_border(mask, width, height, start);
            contours.push(Contour {
                points: compress_runs(points),
            });
        }
    }

    contours
}

/// Background pixels 4-connected to the image border.
fn outer_background(mask: &[bool], width: usize, height: usize) -> Vec<bool> {
    let mut outside = vec![false; mask.len()];
    let mut queue = VecDeque::new();

    let seed = |x: usize, y: usize, outside: &mut Vec<bool>, queue: &mut VecDeque<usize>| {
        let idx = y * width + x;
        if !mask[idx] && !outside[idx] {
            outside[idx] = true;
            queue.push_back(idx);
        }
    };
    for x in 0..width {
        seed(x, 0, &mut outside, &mut queue);
        seed(x, height - 1, &mut outside, &mut queue);
    }
    for y in 0..height {
        seed(0, y, &mut outside, &mut queue);
        seed(width - 1, y, &mut outside, &mut queue);
    }

    while let Some(idx) = queue.pop_front() {
        let (x, y) = (idx % width, idx / width);
        let mut visit = |n: usize| {
            if !mask[n] && !outside[n] {
                outside[n] = true;
                queue.push_back(n);
            }
        };
        if x > 0 {
            visit(idx - 1);
        }
        if x + 1 < width {
            visit(idx + 1);
        }
        if y > 0 {
            visit(idx - width);
        }
        if y + 1 < height {
            visit(idx + width);
        }
    }

    outside
}

/// Flood one 8-connected component from `start`, marking it visited.
/// Returns whether it touches the border or the outer background.
fn label_component(
    mask: &[bool],
    outside: &[bool],
    visited: &mut [bool],
    width: usize,
    height: usize,
    start: usize,
) -> bool {
    let mut external = false;
    let mut queue = VecDeque::from([start]);
    visited[start] = true;

    while let Some(idx) = queue.pop_front() {
        let (x, y) = ((idx % width) as isize, (idx / width) as isize);
        if x == 0 || y == 0 || x as usize == width - 1 || y as usize == height - 1 {
            external = true;
        }
        for (i, &(dx, dy)) in NEIGHBOURS.iter().enumerate() {
            let Some(n) = offset(x + dx, y + dy, width, height) else {
                continue;
            };
            if mask[n] {
                if !visited[n] {
                    visited[n] = true;
                    queue.push_back(n);
                }
            } else if i % 2 == 0 && outside[n] {
                // 4-neighbour of the outer background
                external = true;
            }
        }
    }

    external
}

/// Moore-neighbour trace of the outer border, clockwise, starting at the
/// component's top-left-most pixel.
fn trace_border(mask: &[bool], width: usize, height: usize, start: (usize, usize)) -> Vec<Point> {
    let to_point = |(x, y): (usize, usize)| Point::new(x as i32, y as i32);
    let mut points = vec![to_point(start)];

    let mut current = start;
    let mut back = WEST;
    let mut first_step: Option<(usize, usize)> = None;
    let limit = 4 * mask.len() + 8;

    for _ in 0..limit {
        let Some((next, next_back)) = moore_step(mask, width, height, current, back) else {
            break; // isolated pixel
        };
        match first_step {
            None => first_step = Some(next),
            Some(first) if current == start && next == first => break,
            Some(_) => {}
        }
        if next != start {
            points.push(to_point(next));
        }
        current = next;
        back = next_back;
    }

    points
}

fn moore_step(
    mask: &[bool],
    width: usize,
    height: usize,
    (cx, cy): (usize, usize),
    back: usize,
) -> Option<((usize, usize), usize)> {
    let (cx, cy) = (cx as isize, cy as isize);
    for i in 1..=8 {
        let dir = (back + i) % 8;
        let (nx, ny) = (cx + NEIGHBOURS[dir].0, cy + NEIGHBOURS[dir].1);
        let Some(n) = offset(nx, ny, width, height) else {
            continue;
        };
        if !mask[n] {
            continue;
        }
        // the last background cell examined becomes the new backtrack
        let prev = (dir + 7) % 8;
        let (bx, by) = (cx + NEIGHBOURS[prev].0, cy + NEIGHBOURS[prev].1);
        let rel = (bx - nx, by - ny);
        let new_back = NEIGHBOURS.iter().position(|&d| d == rel).unwrap_or(WEST);
        return Some(((nx as usize, ny as usize), new_back));
    }
    None
}

fn offset(x: isize, y: isize, width: usize, height: usize) -> Option<usize> {
    if x < 0 || y < 0 || x as usize >= width || y as usize >= height {
        return None;
    }
    Some(y as usize * width + x as usize)
}

/// Drop points in the middle of straight horizontal, vertical or diagonal runs.
fn compress_runs(points: Vec<Point>) -> Vec<Point> {
    let n = points.len();
    if n < 3 {
        return points;
    }
    let step = |a: Point, b: Point| (b.x - a.x, b.y - a.y);
    let kept: Vec<Point> = (0..n)
        .filter(|&i| {
            let prev = points[(i + n - 1) % n];
            let next = points[(i + 1) % n];
            step(prev, points[i]) != step(points[i], next)
        })
        .map(|i| points[i])
        .collect();
    if kept.is_empty() {
        vec![points[0]]
    } else {
        kept
    }
}

/// Closed Douglas-Peucker: split at the vertex farthest from the first one
/// and simplify both halves as open chains.
pub fn approximate_closed(points: &[Point], epsilon: f64) -> Vec<Point> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }

    let origin = points[0];
    let far = (1..n)
        .max_by(|&a, &b| {
            distance(origin, points[a])
                .partial_cmp(&distance(origin, points[b]))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(n - 1);

    let mut closing: Vec<Point> = points[far..].to_vec();
    closing.push(origin);

    let mut result = simplify_open(&points[..=far], epsilon);
    result.pop();
    let mut tail = simplify_open(&closing, epsilon);
    tail.pop();
    result.extend(tail);
    result
}

fn simplify_open(points: &[Point], epsilon: f64) -> Vec<Point> {
    let n = points.len();
    if n <= 2 {
        return points.to_vec();
    }

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;
    let mut stack = vec![(0usize, n - 1)];

    while let Some((first, last)) = stack.pop() {
        if last <= first + 1 {
            continue;
        }
        let mut max_dist = 0.0;
        let mut index = first;
        for i in first + 1..last {
            let d = segment_distance(points[i], points[first], points[last]);
            if d > max_dist {
                max_dist = d;
                index = i;
            }
        }
        if max_dist > epsilon {
            keep[index] = true;
            stack.push((first, index));
            stack.push((index, last));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

fn distance(a: Point, b: Point) -> f64 {
    let dx = (b.x - a.x) as f64;
    let dy = (b.y - a.y) as f64;
    (dx * dx + dy * dy).sqrt()
}

/// Distance from `p` to the line through `a` and `b`.
fn segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let len = distance(a, b);
    if len == 0.0 {
        return distance(p, a);
    }
    let cross = (b.x - a.x) as f64 * (a.y - p.y) as f64 - (a.x - p.x) as f64 * (b.y - a.y) as f64;
    cross.abs() / len
}
