//! Backend-neutral drawing commands.
//!
//! The HUD renderer emits [`DrawCommand`]s into a [`Surface`]. The iced canvas
//! widget replays them onto a `canvas::Frame`; tests record them in a
//! [`DrawList`] and inspect what would have been drawn.

use crate::geometry::Point2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Rgba = Rgba::rgb(0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Same colour with its alpha multiplied by `factor`.
    pub fn fade(self, factor: f32) -> Self {
        Self {
            a: (self.a * factor).clamp(0.0, 1.0),
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn centered(center: Point2, width: f32, height: f32) -> Self {
        Self::new(center.x - width / 2.0, center.y - height / 2.0, width, height)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Point2 {
        Point2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn expand(&self, margin: f32) -> Rect {
        Rect::new(self.x - margin, self.y - margin, self.width + margin * 2.0, self.height + margin * 2.0)
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x <= other.right() && other.x <= self.right() && self.y <= other.bottom() && other.y <= self.bottom()
    }

    /// This rect scaled by `factor` toward `focus`.
    pub fn scaled_toward(&self, focus: Point2, factor: f32) -> Rect {
        let c = self.center();
        let moved = focus + (c - focus) * factor;
        Rect::centered(moved, self.width * factor, self.height * factor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAnchor {
    TopLeft,
    Center,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Line {
        from: Point2,
        to: Point2,
        color: Rgba,
        width: f32,
    },
    Polyline {
        points: Vec<Point2>,
        closed: bool,
        color: Rgba,
        width: f32,
    },
    Polygon {
        points: Vec<Point2>,
        fill: Rgba,
    },
    Rect {
        rect: Rect,
        fill: Option<Rgba>,
        stroke: Option<(Rgba, f32)>,
    },
    Circle {
        center: Point2,
        radius: f32,
        fill: Option<Rgba>,
        stroke: Option<(Rgba, f32)>,
    },
    Text {
        content: String,
        position: Point2,
        size: f32,
        color: Rgba,
        anchor: TextAnchor,
    },
}

/// Something the HUD can draw into. Coordinates are local to the current
/// viewport; the surface clips to it.
pub trait Surface {
    fn begin_viewport(&mut self, viewport: Rect);

    fn draw(&mut self, command: DrawCommand);

    fn line(&mut self, from: Point2, to: Point2, color: Rgba, width: f32) {
        self.draw(DrawCommand::Line { from, to, color, width });
    }

    fn polyline(&mut self, points: Vec<Point2>, closed: bool, color: Rgba, width: f32) {
        if points.len() >= 2 {
            self.draw(DrawCommand::Polyline { points, closed, color, width });
        }
    }

    fn text(&mut self, content: &str, position: Point2, size: f32, color: Rgba) {
        self.draw(DrawCommand::Text {
            content: content.to_string(),
            position,
            size,
            color,
            anchor: TextAnchor::TopLeft,
        });
    }
}

/// One clipped region and the commands drawn into it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Viewport {
    pub rect: Rect,
    pub commands: Vec<DrawCommand>,
}

/// A recording surface.
#[derive(Debug, Clone, Default)]
pub struct DrawList {
    viewports: Vec<Viewport>,
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.viewports.clear();
    }

    pub fn viewports(&self) -> &[Viewport] {
        &self.viewports
    }

    pub fn commands(&self) -> impl Iterator<Item = &DrawCommand> {
        self.viewports.iter().flat_map(|v| v.commands.iter())
    }

    pub fn texts(&self) -> Vec<&str> {
        self.commands()
            .filter_map(|c| match c {
                DrawCommand::Text { content, .. } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.commands().next().is_none()
    }
}

impl Surface for DrawList {
    fn begin_viewport(&mut self, viewport: Rect) {
        self.viewports.push(Viewport {
            rect: viewport,
            commands: Vec::new(),
        });
    }

    fn draw(&mut self, command: DrawCommand) {
        if self.viewports.is_empty() {
            self.viewports.push(Viewport::default());
        }
        if let Some(viewport) = self.viewports.last_mut() {
            viewport.commands.push(command);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_intersection() {
        let screen = Rect::new(0.0, 0.0, 640.0, 480.0);
        assert!(Rect::new(600.0, 400.0, 100.0, 100.0).intersects(&screen));
        assert!(!Rect::new(700.0, 10.0, 20.0, 20.0).intersects(&screen));
        assert!(Rect::new(700.0, 10.0, 20.0, 20.0).intersects(&screen.expand(80.0)));
    }

    #[test]
    fn test_draw_list_groups_by_viewport() {
        let mut list = DrawList::new();
        list.begin_viewport(Rect::new(0.0, 0.0, 100.0, 100.0));
        list.text("left", Point2::new(1.0, 1.0), 12.0, Rgba::WHITE);
        list.begin_viewport(Rect::new(100.0, 0.0, 100.0, 100.0));
        list.text("right", Point2::new(1.0, 1.0), 12.0, Rgba::WHITE);
        list.polyline(vec![Point2::new(0.0, 0.0)], false, Rgba::WHITE, 1.0);

        assert_eq!(list.viewports().len(), 2);
        assert_eq!(list.viewports()[1].commands.len(), 1);
        assert_eq!(list.texts(), vec!["left", "right"]);
    }
}
