//! Canvas program that puts a recorded HUD frame on screen.
//!
//! The pipeline renders each tick into a [`DrawList`]; this program replays
//! the list onto an iced `canvas::Frame`, clipping every viewport so the two
//! stereo eyes never bleed into each other.

use iced_custom as iced;

use iced::alignment;
use iced::mouse;
use iced::widget::canvas::{self, Frame, Geometry, Path, Stroke};
use iced::{Color, Pixels, Point, Rectangle, Renderer, Size, Theme};

use crate::geometry::Point2;
use crate::render::{DrawCommand, DrawList, Rect, Rgba, TextAnchor};

pub struct HudCanvas<'a> {
    list: &'a DrawList,
    background: Color,
}

impl<'a> HudCanvas<'a> {
    pub fn new(list: &'a DrawList, background: Color) -> Self {
        Self { list, background }
    }
}

impl<'a, Message> canvas::Program<Message> for HudCanvas<'a> {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = Frame::new(renderer, bounds.size());
        frame.fill_rectangle(Point::ORIGIN, bounds.size(), self.background);

        for viewport in self.list.viewports() {
            frame.with_clip(to_rectangle(&viewport.rect), |f| {
                for command in &viewport.commands {
                    replay(f, command);
                }
            });
        }

        vec![frame.into_geometry()]
    }
}

pub(crate) fn to_color(c: Rgba) -> Color {
    Color::from_rgba(c.r, c.g, c.b, c.a)
}

pub(crate) fn to_point(p: Point2) -> Point {
    Point::new(p.x, p.y)
}

pub(crate) fn to_rectangle(r: &Rect) -> Rectangle {
    Rectangle::new(Point::new(r.x, r.y), Size::new(r.width.max(0.0), r.height.max(0.0)))
}

fn polygon_path(points: &[Point2], closed: bool) -> Path {
    Path::new(|b| {
        let mut iter = points.iter();
        if let Some(first) = iter.next() {
            b.move_to(to_point(*first));
            for p in iter {
                b.line_to(to_point(*p));
            }
            if closed {
                b.close();
            }
        }
    })
}

fn stroke(color: Rgba, width: f32) -> Stroke<'static> {
    Stroke::default().with_color(to_color(color)).with_width(width)
}

fn replay(frame: &mut Frame, command: &DrawCommand) {
    match command {
        DrawCommand::Line { from, to, color, width } => {
            frame.stroke(&Path::line(to_point(*from), to_point(*to)), stroke(*color, *width));
        }
        DrawCommand::Polyline { points, closed, color, width } => {
            frame.stroke(&polygon_path(points, *closed), stroke(*color, *width));
        }
        DrawCommand::Polygon { points, fill } => {
            frame.fill(&polygon_path(points, true), to_color(*fill));
        }
        DrawCommand::Rect { rect, fill, stroke: outline } => {
            let path = Path::rectangle(Point::new(rect.x, rect.y), Size::new(rect.width, rect.height));
            if let Some(fill) = fill {
                frame.fill(&path, to_color(*fill));
            }
            if let Some((color, width)) = outline {
                frame.stroke(&path, stroke(*color, *width));
            }
        }
        DrawCommand::Circle { center, radius, fill, stroke: outline } => {
            let path = Path::circle(to_point(*center), *radius);
            if let Some(fill) = fill {
                frame.fill(&path, to_color(*fill));
            }
            if let Some((color, width)) = outline {
                frame.stroke(&path, stroke(*color, *width));
            }
        }
        DrawCommand::Text { content, position, size, color, anchor } => {
            let (horizontal_alignment, vertical_alignment) = text_alignment(*anchor);
            frame.fill_text(canvas::Text {
                content: content.clone(),
                position: to_point(*position),
                color: to_color(*color),
                size: Pixels(*size),
                horizontal_alignment,
                vertical_alignment,
                ..canvas::Text::default()
            });
        }
    }
}

fn text_alignment(anchor: TextAnchor) -> (alignment::Horizontal, alignment::Vertical) {
    match anchor {
        TextAnchor::TopLeft => (alignment::Horizontal::Left, alignment::Vertical::Top),
        TextAnchor::Center => (alignment::Horizontal::Center, alignment::Vertical::Center),
    }
}
