//! Situational-awareness overlays. Drawn through the same [`ScreenMapper`]
//! as the markers so they can never drift apart from them.

use crate::geometry::Point2;

use super::hud::ScreenMapper;
use super::palette::Palette;
use super::surface::{DrawCommand, Rect, Surface};

const LADDER_STEP_DEG: i32 = 10;
const LADDER_MAX_DEG: i32 = 30;
const GRID_ROWS: usize = 6;
const GRID_COLUMNS: i32 = 6;
const TELEMETRY_TEXT_SIZE: f32 = 12.0;
const TELEMETRY_LINE_HEIGHT: f32 = 15.0;

pub fn horizon(surface: &mut dyn Surface, mapper: &ScreenMapper, palette: &Palette) {
    let y = mapper.height / 2.0;
    let from = mapper.compensate(Point2::new(-mapper.width, y));
    let to = mapper.compensate(Point2::new(mapper.width * 2.0, y));
    surface.line(from, to, palette.horizon, 1.5);
}

pub fn pitch_ladder(surface: &mut dyn Surface, mapper: &ScreenMapper, palette: &Palette) {
    let ppd = mapper.px_per_degree();
    let cx = mapper.width / 2.0;
    let inner = mapper.width * 0.06;
    let outer = inner * 2.0;

    for deg in (-LADDER_MAX_DEG..=LADDER_MAX_DEG).step_by(LADDER_STEP_DEG as usize) {
        if deg == 0 {
            continue;
        }
        let y = mapper.height / 2.0 - deg as f32 * ppd;
        let color = if deg > 0 { palette.horizon } else { palette.horizon.fade(0.6) };
        for (a, b) in [(cx - outer, cx - inner), (cx + inner, cx + outer)] {
            surface.line(
                mapper.compensate(Point2::new(a, y)),
                mapper.compensate(Point2::new(b, y)),
                color,
                1.0,
            );
        }
        surface.text(
            &deg.to_string(),
            mapper.compensate(Point2::new(cx + outer + 4.0, y - 6.0)),
            TELEMETRY_TEXT_SIZE - 2.0,
            color,
        );
    }
}

/// Perspective floor grid below the horizon.
pub fn ground_grid(surface: &mut dyn Surface, mapper: &ScreenMapper, palette: &Palette) {
    let (w, h) = (mapper.width, mapper.height);
    let horizon_y = h / 2.0;

    for row in 1..=GRID_ROWS {
        let t = row as f32 / GRID_ROWS as f32;
        let y = horizon_y + horizon_y * t * t;
        surface.line(
            mapper.compensate(Point2::new(-w * 0.5, y)),
            mapper.compensate(Point2::new(w * 1.5, y)),
            palette.grid,
            1.0,
        );
    }

    let cx = w / 2.0;
    for column in -GRID_COLUMNS..=GRID_COLUMNS {
        let c = column as f32;
        surface.line(
            mapper.compensate(Point2::new(cx + c * w * 0.02, horizon_y + 2.0)),
            mapper.compensate(Point2::new(cx + c * w / 4.0, h * 1.2)),
            palette.grid,
            1.0,
        );
    }
}

/// Screen-locked status block in the top left corner.
pub fn telemetry(surface: &mut dyn Surface, lines: &[String], palette: &Palette) {
    if lines.is_empty() {
        return;
    }
    let chars = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) as f32;
    let plate = Rect::new(
        8.0,
        8.0,
        chars * TELEMETRY_TEXT_SIZE * 0.6 + 12.0,
        lines.len() as f32 * TELEMETRY_LINE_HEIGHT + 8.0,
    );
    surface.draw(DrawCommand::Rect {
        rect: plate,
        fill: Some(palette.plate),
        stroke: None,
    });
    for (i, line) in lines.iter().enumerate() {
        surface.text(
            line,
            Point2::new(plate.x + 6.0, plate.y + 4.0 + i as f32 * TELEMETRY_LINE_HEIGHT),
            TELEMETRY_TEXT_SIZE,
            palette.telemetry,
        );
    }
}
