//! Software-rendered view using `minifb`.
//!
//! Layout (portrait, like the handheld it stands in for):
//!
//! ```text
//! ┌──────────────────────────┐
//! │  title / status          │
//! │                          │
//! │          ┌─┐             │
//! │          │ │  bottle     │
//! │         ╱   ╲            │
//! │        │     │           │
//! │        │     │           │
//! │        └─────┘           │
//! │     [ TILT TO POUR ]     │  hint overlay (fades after start)
//! │  pitch / roll / still    │
//! │  key legend              │
//! └──────────────────────────┘
//! ```

use std::sync::mpsc::Sender;
use std::time::Duration;

use glam::{Vec3, Vec4};
use minifb::{Key, KeyRepeat, MouseButton, Window, WindowOptions};

use crate::error::{PourError, PourResult};
use crate::scene::Scene;
use crate::sensor::SimInput;

// ════════════════════════════════════════════════════════════════════════════
// Layout constants
// ════════════════════════════════════════════════════════════════════════════

pub const WIN_W:      usize = 480;
pub const WIN_H:      usize = 800;
const BG_TOP:         u32   = 0xFF1A1A2E;
const BG_BOTTOM:      u32   = 0xFF0F3460;
const TEXT_BG:        u32   = 0xFF16213E;
const TEXT_COLOR:     u32   = 0xFFEEEEEE;
const DIM_TEXT:       u32   = 0xFF888888;
const ACCENT:         u32   = 0xFFFFD700;  // gold
const DENIED_COLOR:   u32   = 0xFFFF6B6B;
const STATUS_Y:       usize = WIN_H - 70;
const GLYPH_SCALE:    usize = 3;

/// Degrees of simulated tilt per frame while an arrow key is held.
const SIM_TILT_STEP:  f64   = 1.5;

// ════════════════════════════════════════════════════════════════════════════
// Overlay: what the app wants drawn on top of the scene
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, Default)]
pub struct Overlay {
    /// Centered call to action before start.
    pub prompt:  Option<String>,
    /// Short-lived hint after start.
    pub hint:    Option<String>,
    /// Terminal error (permission denied).
    pub message: Option<String>,
    pub status:  String,
    /// Highlight while a pour is happening.
    pub pouring: bool,
}

/// Window-level action from one input poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiAction {
    None,
    Start,
    Quit,
}

// ════════════════════════════════════════════════════════════════════════════
// Canvas: framebuffer, depth buffer, and drawing primitives
// ════════════════════════════════════════════════════════════════════════════

pub struct Canvas {
    pub width:  usize,
    pub height: usize,
    pub buf:    Vec<u32>,
    depth:      Vec<f32>,
}

impl Canvas {
    pub fn new(width: usize, height: usize) -> Self {
        Canvas {
            width,
            height,
            buf:   vec![BG_TOP; width * height],
            depth: vec![f32::INFINITY; width * height],
        }
    }

    /// Vertical background gradient; resets depth.
    pub fn clear(&mut self) {
        for row in 0..self.height {
            let t = row as f32 / self.height.max(1) as f32;
            let color = blend(BG_TOP, BG_BOTTOM, t);
            self.buf[row * self.width..(row + 1) * self.width].fill(color);
        }
        self.depth.fill(f32::INFINITY);
    }

    /// Release pixel and depth storage.
    pub fn release(&mut self) {
        self.buf = Vec::new();
        self.depth = Vec::new();
        self.width = 0;
        self.height = 0;
    }

    // ── Scene ────────────────────────────────────────────────────────────

    /// Flat-shaded, z-buffered draw of the scene's current model.
    pub fn draw_scene(&mut self, scene: &Scene) {
        let aspect = self.width as f32 / self.height.max(1) as f32;
        let model = scene.model_matrix();
        let mvp = scene.view_projection(aspect) * model;
        let light = Vec3::new(0.4, 0.8, 0.6).normalize();
        let mesh = scene.mesh();

        for &tri in &mesh.triangles {
            let world = tri.map(|i| model.transform_point3(mesh.positions[i as usize]));
            let normal = (world[1] - world[0]).cross(world[2] - world[0]);
            if normal.length_squared() < 1e-12 { continue; }
            let shade = 0.25 + 0.75 * normal.normalize().dot(light).abs();

            let clip = tri.map(|i| mvp * mesh.positions[i as usize].extend(1.0));
            if clip.iter().any(|c| c.w <= 1e-4) { continue; }
            let screen = clip.map(|c| self.to_screen(c));
            self.fill_triangle(screen, scale_color(mesh.color, shade));
        }
    }

    fn to_screen(&self, c: Vec4) -> Vec3 {
        let ndc = c.truncate() / c.w;
        Vec3::new(
            (ndc.x * 0.5 + 0.5) * self.width as f32,
            (1.0 - (ndc.y * 0.5 + 0.5)) * self.height as f32,
            ndc.z,
        )
    }

    fn fill_triangle(&mut self, v: [Vec3; 3], color: u32) {
        let area = edge(v[0], v[1], v[2]);
        if area.abs() < 1e-6 { return; }

        let min_x = v.iter().map(|p| p.x).fold(f32::INFINITY, f32::min).floor().max(0.0) as usize;
        let max_x = v.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max).ceil()
            .min(self.width as f32 - 1.0);
        let min_y = v.iter().map(|p| p.y).fold(f32::INFINITY, f32::min).floor().max(0.0) as usize;
        let max_y = v.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max).ceil()
            .min(self.height as f32 - 1.0);
        if max_x < 0.0 || max_y < 0.0 { return; }
        let (max_x, max_y) = (max_x as usize, max_y as usize);

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let p = Vec3::new(x as f32 + 0.5, y as f32 + 0.5, 0.0);
                let w0 = edge(v[1], v[2], p) / area;
                let w1 = edge(v[2], v[0], p) / area;
                let w2 = edge(v[0], v[1], p) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 { continue; }
                let z = w0 * v[0].z + w1 * v[1].z + w2 * v[2].z;
                let idx = y * self.width + x;
                if z < self.depth[idx] {
                    self.depth[idx] = z;
                    self.buf[idx] = color;
                }
            }
        }
    }

    // ── Overlay ──────────────────────────────────────────────────────────

    pub fn draw_overlay(&mut self, overlay: &Overlay) {
        let (w, h) = (self.width, self.height);

        if let Some(prompt) = &overlay.prompt {
            let y = (h / 2).saturating_sub(20);
            self.fill_rect(0, y, w, 40, TEXT_BG);
            self.draw_text_centered(prompt, y + 12, ACCENT);
        }
        if let Some(hint) = &overlay.hint {
            let y = h * 3 / 4;
            self.fill_rect(w / 6, y, w * 2 / 3, 36, TEXT_BG);
            self.draw_border(w / 6, y, w * 2 / 3, 36, ACCENT);
            self.draw_text_centered(hint, y + 11, ACCENT);
        }
        if let Some(message) = &overlay.message {
            let y = (h / 2).saturating_sub(20);
            self.fill_rect(0, y, w, 40, TEXT_BG);
            self.draw_text_centered(message, y + 12, DENIED_COLOR);
        }

        let status_y = STATUS_Y.min(h.saturating_sub(70));
        self.fill_rect(0, status_y, w, h - status_y, TEXT_BG);
        let status_color = if overlay.pouring { ACCENT } else { TEXT_COLOR };
        self.draw_text(&overlay.status, 10, status_y + 12, status_color);
        self.draw_text(
            "spc=start arrows=tilt j=shake q=quit",
            10, h.saturating_sub(24), DIM_TEXT,
        );
        self.draw_text("POUR BOTTLE", 10, 12, DIM_TEXT);
    }

    // ── Primitive drawing helpers ────────────────────────────────────────

    fn fill_rect(&mut self, x: usize, y: usize, w: usize, h: usize, color: u32) {
        for row in y..(y + h).min(self.height) {
            for col in x..(x + w).min(self.width) {
                self.buf[row * self.width + col] = color;
            }
        }
    }

    fn draw_border(&mut self, x: usize, y: usize, w: usize, h: usize, color: u32) {
        if w == 0 || h == 0 { return; }
        for col in x..(x + w).min(self.width) {
            self.set_pixel(col, y, color);
            self.set_pixel(col, y + h - 1, color);
        }
        for row in y..(y + h).min(self.height) {
            self.set_pixel(x, row, color);
            self.set_pixel(x + w - 1, row, color);
        }
    }

    fn set_pixel(&mut self, x: usize, y: usize, color: u32) {
        if x < self.width && y < self.height {
            self.buf[y * self.width + x] = color;
        }
    }

    fn text_width(text: &str) -> usize {
        text.chars().count() * 4 * GLYPH_SCALE
    }

    fn draw_text_centered(&mut self, text: &str, y: usize, color: u32) {
        let x = self.width.saturating_sub(Self::text_width(text)) / 2;
        self.draw_text(text, x, y, color);
    }

    /// 3×5 bitmap font, scaled up by `GLYPH_SCALE`.
    fn draw_text(&mut self, text: &str, x: usize, y: usize, color: u32) {
        let mut cx = x;
        for ch in text.chars() {
            if cx + 3 * GLYPH_SCALE > self.width { break; }
            let glyph = char_glyph(ch);
            for (row, &bits) in glyph.iter().enumerate() {
                for col in 0..3usize {
                    if bits & (1 << (2 - col)) == 0 { continue; }
                    for dy in 0..GLYPH_SCALE {
                        for dx in 0..GLYPH_SCALE {
                            self.set_pixel(cx + col * GLYPH_SCALE + dx, y + row * GLYPH_SCALE + dy, color);
                        }
                    }
                }
            }
            cx += 4 * GLYPH_SCALE;
        }
    }
}

/// Signed doubled area of `(a, b, p)` in screen space.
fn edge(a: Vec3, b: Vec3, p: Vec3) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

// ════════════════════════════════════════════════════════════════════════════
// Visualizer: the window
// ════════════════════════════════════════════════════════════════════════════

pub struct Visualizer {
    window:    Window,
    canvas:    Canvas,
    sim_tx:    Option<Sender<SimInput>>,
    sim_pitch: f64,
    sim_roll:  f64,
}

impl Visualizer {
    pub fn new() -> PourResult<Self> {
        let mut window = Window::new(
            "Pour Bottle: tilt to pour",
            WIN_W, WIN_H,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        ).map_err(|e| PourError::Window(e.to_string()))?;

        window.limit_update_rate(Some(Duration::from_millis(16))); // ~60fps

        Ok(Visualizer {
            window,
            canvas:    Canvas::new(WIN_W, WIN_H),
            sim_tx:    None,
            sim_pitch: 0.0,
            sim_roll:  0.0,
        })
    }

    /// Returns false when the window should close.
    pub fn is_open(&self) -> bool { self.window.is_open() }

    /// Route simulated tilt to a running [`SimSensorSource`](crate::sensor::SimSensorSource).
    pub fn attach_sim(&mut self, tx: Sender<SimInput>) { self.sim_tx = Some(tx); }

    pub fn detach_sim(&mut self) { self.sim_tx = None; }

    /// Poll keyboard/mouse.  While a simulator is attached, one tilt sample
    /// is sent per poll, the way a real sensor reports at a steady rate.
    pub fn poll_input(&mut self) -> UiAction {
        if !self.window.is_open() { return UiAction::Quit; }

        let pressed = |k: Key| self.window.is_key_pressed(k, KeyRepeat::No);
        if pressed(Key::Q) || pressed(Key::Escape) {
            return UiAction::Quit;
        }
        let start = pressed(Key::Space) || pressed(Key::Enter)
            || self.window.get_mouse_down(MouseButton::Left);
        let shake = pressed(Key::J);
        let level = pressed(Key::R);

        let held = |k: Key| self.window.is_key_down(k);
        let mut pitch = self.sim_pitch;
        let mut roll  = self.sim_roll;
        if held(Key::Up)    { pitch += SIM_TILT_STEP; }
        if held(Key::Down)  { pitch -= SIM_TILT_STEP; }
        if held(Key::Right) { roll  += SIM_TILT_STEP; }
        if held(Key::Left)  { roll  -= SIM_TILT_STEP; }
        if level { pitch = 0.0; roll = 0.0; }
        self.sim_pitch = pitch.clamp(-90.0, 90.0);
        self.sim_roll  = roll.clamp(-90.0, 90.0);

        let tilt = SimInput::Tilt { pitch_deg: self.sim_pitch, roll_deg: self.sim_roll };
        let delivered = match &self.sim_tx {
            Some(tx) => tx.send(tilt).is_ok() && (!shake || tx.send(SimInput::Shake).is_ok()),
            None     => true,
        };
        if !delivered { self.sim_tx = None; }

        if start { UiAction::Start } else { UiAction::None }
    }

    /// Render one frame.
    pub fn render(&mut self, scene: &Scene, overlay: &Overlay) {
        self.canvas.clear();
        self.canvas.draw_scene(scene);
        self.canvas.draw_overlay(overlay);
        self.window.update_with_buffer(&self.canvas.buf, WIN_W, WIN_H).ok();
    }

    /// Drop the framebuffer and stop simulated input; the window closes when
    /// `self` is dropped.
    pub fn release(&mut self) {
        self.detach_sim();
        self.canvas.release();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Minimal 3×5 bitmap font
// ────────────────────────────────────────────────────────────────────────────

fn char_glyph(c: char) -> [u8; 5] {
    match c {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b001, 0b001, 0b001],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        'a' | 'A' => [0b111, 0b101, 0b111, 0b101, 0b101],
        'b' | 'B' => [0b110, 0b101, 0b110, 0b101, 0b110],
        'c' | 'C' => [0b111, 0b100, 0b100, 0b100, 0b111],
        'd' | 'D' => [0b110, 0b101, 0b101, 0b101, 0b110],
        'e' | 'E' => [0b111, 0b100, 0b111, 0b100, 0b111],
        'f' | 'F' => [0b111, 0b100, 0b111, 0b100, 0b100],
        'g' | 'G' => [0b111, 0b100, 0b101, 0b101, 0b111],
        'h' | 'H' => [0b101, 0b101, 0b111, 0b101, 0b101],
        'i' | 'I' => [0b111, 0b010, 0b010, 0b010, 0b111],
        'j' | 'J' => [0b001, 0b001, 0b001, 0b101, 0b111],
        'k' | 'K' => [0b101, 0b101, 0b110, 0b101, 0b101],
        'l' | 'L' => [0b100, 0b100, 0b100, 0b100, 0b111],
        'm' | 'M' => [0b101, 0b111, 0b101, 0b101, 0b101],
        'n' | 'N' => [0b111, 0b101, 0b101, 0b101, 0b101],
        'o' | 'O' => [0b111, 0b101, 0b101, 0b101, 0b111],
        'p' | 'P' => [0b111, 0b101, 0b111, 0b100, 0b100],
        'q' | 'Q' => [0b111, 0b101, 0b101, 0b111, 0b001],
        'r' | 'R' => [0b110, 0b101, 0b110, 0b101, 0b101],
        's' | 'S' => [0b111, 0b100, 0b111, 0b001, 0b111],
        't' | 'T' => [0b111, 0b010, 0b010, 0b010, 0b010],
        'u' | 'U' => [0b101, 0b101, 0b101, 0b101, 0b111],
        'v' | 'V' => [0b101, 0b101, 0b101, 0b010, 0b010],
        'w' | 'W' => [0b101, 0b101, 0b101, 0b111, 0b101],
        'x' | 'X' => [0b101, 0b101, 0b010, 0b101, 0b101],
        'y' | 'Y' => [0b101, 0b101, 0b111, 0b010, 0b010],
        'z' | 'Z' => [0b111, 0b001, 0b010, 0b100, 0b111],
        '/' => [0b001, 0b001, 0b010, 0b100, 0b100],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        ',' => [0b000, 0b000, 0b000, 0b010, 0b100],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        '=' => [0b000, 0b111, 0b000, 0b111, 0b000],
        '+' => [0b000, 0b010, 0b111, 0b010, 0b000],
        '!' => [0b010, 0b010, 0b010, 0b000, 0b010],
        ' ' => [0b000, 0b000, 0b000, 0b000, 0b000],
        _   => [0b000, 0b000, 0b010, 0b000, 0b000], // fallback dot
    }
}

/// Alpha-blend two ARGB colors. `t` = 0.0 → all `a`, `t` = 1.0 → all `b`.
fn blend(a: u32, b: u32, t: f32) -> u32 {
    let t = t.clamp(0.0, 1.0);
    let lerp = |ca: u32, cb: u32| (ca as f32 * (1.0 - t) + cb as f32 * t) as u32;
    let ar = (a >> 16) & 0xFF; let br = (b >> 16) & 0xFF;
    let ag = (a >>  8) & 0xFF; let bg = (b >>  8) & 0xFF;
    let ab =  a        & 0xFF; let bb =  b        & 0xFF;
    0xFF000000 | (lerp(ar, br) << 16) | (lerp(ag, bg) << 8) | lerp(ab, bb)
}

/// Scale an ARGB color's channels by `k` (clamped to 0–1).
fn scale_color(c: u32, k: f32) -> u32 {
    blend(0xFF000000, c, k)
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Mesh, GLASS_GREEN};

    fn scene() -> Scene {
        Scene::new(Mesh::bottle(16), Box::new(|| true))
    }

    #[test]
    fn bottle_covers_the_centre() {
        let mut c = Canvas::new(120, 200);
        c.clear();
        let before = c.buf.clone();
        c.draw_scene(&scene());
        let centre = 100 * 120 + 60;
        assert_ne!(c.buf[centre], before[centre]);
        // Corners stay background.
        assert_eq!(c.buf[0], before[0]);
        assert_eq!(c.buf[120 * 200 - 1], before[120 * 200 - 1]);
    }

    #[test]
    fn shading_stays_in_hue() {
        let mut c = Canvas::new(120, 200);
        c.clear();
        c.draw_scene(&scene());
        let px = c.buf[100 * 120 + 60];
        let g = (px >> 8) & 0xFF;
        let r = (px >> 16) & 0xFF;
        assert!(g > r, "bottle should read green, got {:08X} from {:08X}", px, GLASS_GREEN);
    }

    #[test]
    fn degenerate_triangles_are_skipped() {
        let mut c = Canvas::new(10, 10);
        c.clear();
        let before = c.buf.clone();
        let p = Vec3::new(5.0, 5.0, 0.5);
        c.fill_triangle([p, p, p], 0xFFFFFFFF);
        assert_eq!(c.buf, before);
    }

    #[test]
    fn nearer_triangle_wins() {
        let mut c = Canvas::new(10, 10);
        c.clear();
        let tri = |z: f32| [Vec3::new(0.0, 0.0, z), Vec3::new(10.0, 0.0, z), Vec3::new(0.0, 10.0, z)];
        c.fill_triangle(tri(0.2), 0xFF00FF00);
        c.fill_triangle(tri(0.8), 0xFFFF0000);
        assert_eq!(c.buf[2 * 10 + 2], 0xFF00FF00);
    }

    #[test]
    fn offscreen_triangle_is_clipped() {
        let mut c = Canvas::new(10, 10);
        c.clear();
        let before = c.buf.clone();
        c.fill_triangle(
            [Vec3::new(-50.0, -50.0, 0.5), Vec3::new(-40.0, -50.0, 0.5), Vec3::new(-50.0, -40.0, 0.5)],
            0xFFFFFFFF,
        );
        assert_eq!(c.buf, before);
    }

    #[test]
    fn overlay_draws_hint_and_status() {
        let mut c = Canvas::new(WIN_W, WIN_H);
        c.clear();
        let before = c.buf.clone();
        c.draw_overlay(&Overlay {
            hint:   Some("TILT TO POUR".to_string()),
            status: "pitch 0".to_string(),
            ..Overlay::default()
        });
        assert_ne!(c.buf, before);
        assert!(c.buf.iter().any(|&p| p == ACCENT));
    }

    #[test]
    fn overlay_fits_a_tiny_canvas() {
        let mut c = Canvas::new(30, 20);
        c.clear();
        c.draw_overlay(&Overlay {
            prompt:  Some("PRESS SPACE TO START".to_string()),
            hint:    Some("TILT TO POUR".to_string()),
            message: Some("MOTION ACCESS DENIED".to_string()),
            status:  "no motion data".to_string(),
            pouring: true,
        });
        assert!(c.buf.iter().any(|&p| p == TEXT_BG));
    }

    #[test]
    fn blend_endpoints() {
        assert_eq!(blend(0xFF102030, 0xFFFFFFFF, 0.0), 0xFF102030);
        assert_eq!(blend(0xFF102030, 0xFFFFFFFF, 1.0), 0xFFFFFFFF);
        assert_eq!(scale_color(0xFF804020, 0.0), 0xFF000000);
    }

    #[test]
    fn release_frees_buffers() {
        let mut c = Canvas::new(10, 10);
        c.release();
        assert!(c.buf.is_empty());
    }
}
