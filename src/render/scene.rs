//! Procedural demo scene
//!
//! Renders one RGBA frame per tick into a reused back buffer: a slowly
//! cycling background shade, a flash effect when someone triggers a bang,
//! and a circle sweeping across the lower third.

use image::{Rgba, RgbaImage};
use std::path::Path;
use std::time::{Duration, Instant};

/// How long the bang flash takes to fade.
const BANG_DECAY: Duration = Duration::from_secs(5);

/// Radius of the sweeping circle, in pixels.
const CIRCLE_RADIUS: i64 = 50;

pub struct Scene {
    width: u32,
    height: u32,
    frame: RgbaImage,
    frame_num: u64,

    pub title: String,
    pub paused: bool,
    last_bang: Option<Instant>,
}

impl Scene {
    pub fn new(width: u32, height: u32, title: String) -> Self {
        Self {
            width,
            height,
            frame: RgbaImage::new(width, height),
            frame_num: 0,
            title,
            paused: false,
            last_bang: None,
        }
    }

    pub fn frame_num(&self) -> u64 {
        self.frame_num
    }

    /// Trigger the flash effect.
    pub fn bang(&mut self) {
        self.last_bang = Some(Instant::now());
    }

    /// Advance the scene by one tick and redraw the back buffer.
    pub fn render(&mut self) -> &RgbaImage {
        self.frame_num += 1;

        let shade = self.background_shade(Instant::now());
        let background = to_channel(shade);
        for pixel in self.frame.pixels_mut() {
            *pixel = Rgba([background, background, background, 255]);
        }

        let cx = (self.frame_num * 2 % self.width as u64) as i64;
        let cy = (self.height as i64 - 120).max(0);
        self.fill_circle(cx, cy, CIRCLE_RADIUS, Rgba([255, 255, 255, 255]));

        &self.frame
    }

    /// Save the current frame as a PNG.
    pub fn capture(&self, path: &Path) -> anyhow::Result<()> {
        self.frame.save(path)?;
        Ok(())
    }

    /// Background brightness in [0, 1]: a slow cycle keyed to the frame
    /// number, overridden by the bang ramp while the flash decays.
    fn background_shade(&self, now: Instant) -> f64 {
        if let Some(last_bang) = self.last_bang {
            let since = now.saturating_duration_since(last_bang);
            if since < BANG_DECAY {
                return since.as_secs_f64();
            }
        }
        (self.frame_num % 200) as f64 / 1000.0
    }

    fn fill_circle(&mut self, cx: i64, cy: i64, radius: i64, color: Rgba<u8>) {
        let x_range = (cx - radius).max(0)..=(cx + radius).min(self.width as i64 - 1);
        for x in x_range {
            for y in (cy - radius).max(0)..=(cy + radius).min(self.height as i64 - 1) {
                let (dx, dy) = (x - cx, y - cy);
                if dx * dx + dy * dy <= radius * radius {
                    self.frame.put_pixel(x as u32, y as u32, color);
                }
            }
        }
    }
}

/// Clamp a [0, 1] brightness into one 8-bit channel.
fn to_channel(shade: f64) -> u8 {
    (shade.clamp(0.0, 1.0) * 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn frames_advance_and_cycle_the_background() {
        let mut scene = Scene::new(64, 48, "test".into());
        assert_eq!(scene.frame_num(), 0);

        let frame = scene.render();
        assert_eq!(frame.dimensions(), (64, 48));
        assert_eq!(scene.frame_num(), 1);

        // frame 1 of the cycle: shade 1/1000
        let corner = *scene.frame.get_pixel(0, 0);
        assert_eq!(corner, Rgba([0, 0, 0, 255]));

        // deep into the cycle the background has brightened
        for _ in 0..150 {
            scene.render();
        }
        let corner = *scene.frame.get_pixel(0, 0);
        assert!(corner[0] > 30);
    }

    #[test]
    fn bang_overrides_the_background_ramp() {
        let mut scene = Scene::new(64, 48, "test".into());
        scene.bang();

        // right after the bang the ramp starts from black
        assert!(scene.background_shade(Instant::now()) < 0.1);

        // a few simulated seconds in, it is glowing bright
        let later = Instant::now() + Duration::from_secs(4);
        assert!(scene.background_shade(later) > 0.5);

        // after the decay window the normal cycle is back
        let done = Instant::now() + Duration::from_secs(6);
        assert_eq!(
            scene.background_shade(done),
            (scene.frame_num % 200) as f64 / 1000.0
        );
    }

    #[test]
    fn circle_sweeps_with_the_frame_counter() {
        let mut scene = Scene::new(640, 480, "test".into());
        scene.render();

        // frame 1: circle centered at x=2, y=360
        assert_eq!(*scene.frame.get_pixel(2, 360), Rgba([255, 255, 255, 255]));
        // far away from the circle: plain background
        assert_eq!(*scene.frame.get_pixel(600, 10), *scene.frame.get_pixel(300, 10));
    }

    #[test]
    fn capture_writes_a_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capture.png");

        let mut scene = Scene::new(32, 32, "test".into());
        scene.render();
        scene.capture(&path).unwrap();

        let reloaded = image::open(&path).unwrap().into_rgba8();
        assert_eq!(reloaded.dimensions(), (32, 32));
    }
}
