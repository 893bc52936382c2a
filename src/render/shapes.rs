//! Marker primitives drawn in viewport pixels.

use crate::geometry::Point2;

use super::palette::Palette;
use super::skeleton::{EDGES, NAMED_JOINTS};
use super::surface::{DrawCommand, Rect, Rgba, Surface};

pub const LABEL_TEXT_SIZE: f32 = 13.0;
const LABEL_LINE_HEIGHT: f32 = 16.0;
const LABEL_PADDING: f32 = 4.0;
/// Rough glyph advance as a fraction of the text size.
const CHAR_WIDTH: f32 = 0.6;
const JOINT_TEXT_SIZE: f32 = 10.0;
/// Back face of the tunnel relative to the front face.
pub const TUNNEL_DEPTH: f32 = 0.82;

/// Stroke and bracket scale from distance: closer is bolder.
pub fn depth_factor(distance: Option<f32>) -> f32 {
    match distance {
        Some(d) if d.is_finite() && d > 0.0 => (4.0 / d).clamp(0.6, 2.0),
        _ => 1.0,
    }
}

/// Four L-shaped corner strokes around `rect`.
pub fn corner_brackets(surface: &mut dyn Surface, rect: Rect, color: Rgba, depth: f32) {
    let limit = rect.width.min(rect.height) / 2.0;
    let arm = (limit * 0.45 * depth).min(limit).max(2.0);
    let width = 2.0 * depth;
    let (l, t, r, b) = (rect.x, rect.y, rect.right(), rect.bottom());

    let corners = [
        (Point2::new(l, t), 1.0, 1.0),
        (Point2::new(r, t), -1.0, 1.0),
        (Point2::new(l, b), 1.0, -1.0),
        (Point2::new(r, b), -1.0, -1.0),
    ];
    for (corner, sx, sy) in corners {
        surface.line(corner, corner + Point2::new(arm * sx, 0.0), color, width);
        surface.line(corner, corner + Point2::new(0.0, arm * sy), color, width);
    }
}

/// Receding back face joined to the front face, converging on `vanishing`.
pub fn tunnel(surface: &mut dyn Surface, rect: Rect, vanishing: Point2, color: Rgba) {
    let back = rect.scaled_toward(vanishing, TUNNEL_DEPTH);
    surface.draw(DrawCommand::Rect {
        rect: back,
        fill: None,
        stroke: Some((color.fade(0.5), 1.0)),
    });

    let front = [
        Point2::new(rect.x, rect.y),
        Point2::new(rect.right(), rect.y),
        Point2::new(rect.x, rect.bottom()),
        Point2::new(rect.right(), rect.bottom()),
    ];
    let rear = [
        Point2::new(back.x, back.y),
        Point2::new(back.right(), back.y),
        Point2::new(back.x, back.bottom()),
        Point2::new(back.right(), back.bottom()),
    ];
    for (f, r) in front.into_iter().zip(rear) {
        surface.line(f, r, color.fade(0.35), 1.0);
    }
}

/// Bones between confident joint pairs, joint dots and named joint tags.
/// Returns the number of bones drawn.
pub fn skeleton(
    surface: &mut dyn Surface,
    joints: &[(Point2, f32)],
    color: Rgba,
    palette: &Palette,
    threshold: f32,
    depth: f32,
    label_joints: bool,
) -> usize {
    let confident = |i: usize| joints.get(i).filter(|(_, c)| *c >= threshold).map(|(p, _)| *p);

    let mut bones = 0;
    for (a, b) in EDGES {
        if let (Some(pa), Some(pb)) = (confident(a), confident(b)) {
            surface.line(pa, pb, color, 2.0 * depth);
            bones += 1;
        }
    }

    let joint_color = palette.joint.fade(color.a);
    for (p, c) in joints {
        if *c >= threshold {
            surface.draw(DrawCommand::Circle {
                center: *p,
                radius: 3.0 * depth,
                fill: Some(joint_color),
                stroke: None,
            });
        }
    }

    if label_joints {
        for (index, name) in NAMED_JOINTS {
            if let Some(p) = confident(index) {
                surface.text(name, p + Point2::new(6.0, -12.0), JOINT_TEXT_SIZE, palette.text.fade(color.a));
            }
        }
    }
    bones
}

fn is_filled_region(name: &str) -> bool {
    let name = name.to_lowercase();
    (name.contains("eye") && !name.contains("brow")) || name.contains("lip") || name.contains("mouth")
}

fn is_closed_curve(name: &str) -> bool {
    let name = name.to_lowercase();
    is_filled_region(&name) || name.contains("silhouette") || name.contains("oval")
}

/// Facial curves: eyes and lips filled, everything else stroked only.
pub fn face_mesh(surface: &mut dyn Surface, contours: &[(String, Vec<Point2>)], color: Rgba, depth: f32) {
    for (name, points) in contours {
        if points.len() < 2 {
            continue;
        }
        if is_filled_region(name) && points.len() >= 3 {
            surface.draw(DrawCommand::Polygon {
                points: points.clone(),
                fill: color.fade(0.35),
            });
        }
        surface.polyline(points.clone(), is_closed_curve(name), color, 1.2 * depth);
    }
}

/// Ring and crosshair for point markers.
pub fn point_marker(surface: &mut dyn Surface, center: Point2, color: Rgba, depth: f32) {
    let radius = 5.0 * depth;
    surface.draw(DrawCommand::Circle {
        center,
        radius,
        fill: None,
        stroke: Some((color, 1.5 * depth)),
    });
    let arm = radius * 1.8;
    surface.line(center - Point2::new(arm, 0.0), center + Point2::new(arm, 0.0), color, 1.0);
    surface.line(center - Point2::new(0.0, arm), center + Point2::new(0.0, arm), color, 1.0);
}

/// Size of a text plate holding `lines`.
pub fn label_size(lines: &[String]) -> (f32, f32) {
    let chars = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) as f32;
    (
        chars * LABEL_TEXT_SIZE * CHAR_WIDTH + LABEL_PADDING * 2.0,
        lines.len() as f32 * LABEL_LINE_HEIGHT + LABEL_PADDING * 2.0,
    )
}

/// Text lines on a plate above `anchor`, flipped below it when there is no
/// room above. Returns the plate.
pub fn label(
    surface: &mut dyn Surface,
    lines: &[String],
    anchor: Rect,
    bounds: Rect,
    accent: Rgba,
    palette: &Palette,
    opacity: f32,
) -> Rect {
    let (width, height) = label_size(lines);
    let mut y = anchor.y - height - 4.0;
    if y < bounds.y {
        y = anchor.bottom() + 4.0;
    }
    let x = anchor.x.min(bounds.right() - width).max(bounds.x);
    let plate = Rect::new(x, y, width, height);

    surface.draw(DrawCommand::Rect {
        rect: plate,
        fill: Some(palette.plate.fade(opacity)),
        stroke: Some((accent.fade(opacity), 1.0)),
    });
    for (i, line) in lines.iter().enumerate() {
        surface.text(
            line,
            Point2::new(x + LABEL_PADDING, y + LABEL_PADDING + i as f32 * LABEL_LINE_HEIGHT),
            LABEL_TEXT_SIZE,
            palette.text.fade(opacity),
        );
    }
    plate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::surface::DrawList;

    fn lines(list: &DrawList) -> Vec<f32> {
        list.commands()
            .filter_map(|c| match c {
                DrawCommand::Line { width, .. } => Some(*width),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_brackets_are_eight_strokes_scaled_by_depth() {
        let mut near = DrawList::new();
        corner_brackets(&mut near, Rect::new(10.0, 10.0, 100.0, 200.0), Rgba::WHITE, depth_factor(Some(2.0)));
        let mut far = DrawList::new();
        corner_brackets(&mut far, Rect::new(10.0, 10.0, 100.0, 200.0), Rgba::WHITE, depth_factor(Some(40.0)));

        assert_eq!(lines(&near).len(), 8);
        assert!(lines(&near)[0] > lines(&far)[0]);
        assert_eq!(depth_factor(None), 1.0);
    }

    #[test]
    fn test_skeleton_skips_low_confidence_bones() {
        let mut joints = vec![(Point2::new(0.0, 0.0), 0.9); 17];
        // Left wrist unsure: elbow-wrist bone goes away
        joints[9].1 = 0.1;
        let mut list = DrawList::new();
        let bones = skeleton(&mut list, &joints, Rgba::WHITE, &Palette::default(), 0.3, 1.0, true);
        assert_eq!(bones, EDGES.len() - 1);
        assert!(!list.texts().contains(&"L HAND"));
        assert!(list.texts().contains(&"R HAND"));
    }

    #[test]
    fn test_face_mesh_fills_eyes_and_lips_only() {
        let tri = vec![Point2::new(0.0, 0.0), Point2::new(4.0, 0.0), Point2::new(2.0, 3.0)];
        let contours = vec![
            ("left_eye".to_string(), tri.clone()),
            ("left_eyebrow".to_string(), tri.clone()),
            ("lips".to_string(), tri.clone()),
            ("nose".to_string(), tri),
        ];
        let mut list = DrawList::new();
        face_mesh(&mut list, &contours, Rgba::WHITE, 1.0);

        let fills = list.commands().filter(|c| matches!(c, DrawCommand::Polygon { .. })).count();
        let strokes = list.commands().filter(|c| matches!(c, DrawCommand::Polyline { .. })).count();
        assert_eq!(fills, 2);
        assert_eq!(strokes, 4);
    }

    #[test]
    fn test_label_flips_below_at_top_edge() {
        let bounds = Rect::new(0.0, 0.0, 640.0, 480.0);
        let text = vec!["PERSON 90%".to_string(), "10.2 m".to_string()];
        let mut list = DrawList::new();
        let plate = label(&mut list, &text, Rect::new(100.0, 5.0, 50.0, 80.0), bounds, Rgba::WHITE, &Palette::default(), 1.0);
        assert!(plate.y >= 85.0);

        let plate = label(&mut list, &text, Rect::new(620.0, 200.0, 50.0, 80.0), bounds, Rgba::WHITE, &Palette::default(), 1.0);
        assert!(plate.y < 200.0);
        assert!(plate.right() <= 640.0);
    }
}
