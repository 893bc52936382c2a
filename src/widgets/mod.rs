pub mod hud_canvas;
