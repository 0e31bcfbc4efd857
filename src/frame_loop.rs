// frame_loop.rs — per-frame driver: orientation tick, look-at, particle spin, draw

use crate::orientation::{OrientationController, LOOK_AT_RADIUS};
use glam::Vec3;
use std::time::{Duration, Instant};

/// What one city's scene has to offer the frame loop.
pub trait RenderSurface {
    /// Aim the camera (sitting at the origin) at `target`.
    fn set_look_at(&mut self, target: Vec3);
    fn set_field_of_view(&mut self, fov_deg: f32);
    fn advance_particles(&mut self);
    fn resize(&mut self, width: u32, height: u32);
    fn render_frame(&mut self);
    /// Release GPU resources. Called once, after the loop has been stopped.
    fn dispose(&mut self);
}

/// Explicitly started and stopped frame schedule.
///
/// The host calls [`FrameLoop::step`] once per display refresh and only asks for
/// another redraw while it returns `true`. A stopped loop never touches its
/// surface, which is what keeps disposed scenes from being drawn.
#[derive(Debug, Default)]
pub struct FrameLoop {
    running: bool,
    frames: u64,
}

impl FrameLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Frames drawn since the loop was created.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn step<S: RenderSurface + ?Sized>(
        &mut self,
        controller: &mut OrientationController,
        surface: &mut S,
    ) -> bool {
        if !self.running {
            return false;
        }

        controller.tick();
        surface.set_look_at(controller.look_at(LOOK_AT_RADIUS));
        surface.advance_particles();
        surface.render_frame();
        self.frames += 1;

        self.running
    }
}

/// Frames-per-second over one second windows.
#[derive(Debug)]
pub struct FpsCounter {
    window_start: Instant,
    frames: u32,
    fps: f32,
}

impl FpsCounter {
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            frames: 0,
            fps: 0.0,
        }
    }

    pub fn frame(&mut self, now: Instant) -> f32 {
        self.frames += 1;
        let elapsed = now.duration_since(self.window_start);
        if elapsed >= Duration::from_secs(1) {
            self.fps = self.frames as f32 / elapsed.as_secs_f32();
            self.frames = 0;
            self.window_start = now;
        }
        self.fps
    }

    #[cfg(test)]
    pub fn fps(&self) -> f32 {
        self.fps
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::orientation::ViewConfig;
    use approx::assert_abs_diff_eq;

    /// Records what the loop asked of it.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSurface {
        pub look_at: Option<Vec3>,
        pub fov: Option<f32>,
        pub particle_steps: u32,
        pub frames: u32,
        pub size: (u32, u32),
        pub resizes: u32,
        pub disposed: u32,
    }

    impl RenderSurface for RecordingSurface {
        fn set_look_at(&mut self, target: Vec3) {
            self.look_at = Some(target);
        }
        fn set_field_of_view(&mut self, fov_deg: f32) {
            self.fov = Some(fov_deg);
        }
        fn advance_particles(&mut self) {
            self.particle_steps += 1;
        }
        fn resize(&mut self, width: u32, height: u32) {
            self.size = (width, height);
            self.resizes += 1;
        }
        fn render_frame(&mut self) {
            self.frames += 1;
        }
        fn dispose(&mut self) {
            self.disposed += 1;
        }
    }

    #[test]
    fn stopped_loop_draws_nothing() {
        let mut frame_loop = FrameLoop::new();
        let mut controller = OrientationController::default();
        let mut surface = RecordingSurface::default();

        assert!(!frame_loop.step(&mut controller, &mut surface));
        assert_eq!(surface.frames, 0);
        assert_eq!(controller.state().longitude, 0.0);
    }

    #[test]
    fn each_step_ticks_aims_spins_and_draws() {
        let mut frame_loop = FrameLoop::new();
        let mut controller = OrientationController::default();
        let mut surface = RecordingSurface::default();

        frame_loop.start();
        for _ in 0..3 {
            assert!(frame_loop.step(&mut controller, &mut surface));
        }

        assert_eq!(surface.frames, 3);
        assert_eq!(surface.particle_steps, 3);
        assert_eq!(frame_loop.frames(), 3);
        assert_abs_diff_eq!(controller.state().longitude, 0.15, epsilon = 1e-5);

        let target = surface.look_at.unwrap();
        assert_abs_diff_eq!(target.length(), LOOK_AT_RADIUS, epsilon = 1e-2);

        frame_loop.stop();
        assert!(!frame_loop.step(&mut controller, &mut surface));
        assert_eq!(surface.frames, 3);
    }

    #[test]
    fn drag_in_progress_freezes_longitude_across_frames() {
        let mut frame_loop = FrameLoop::new();
        let mut controller = OrientationController::new(ViewConfig::default());
        let mut surface = RecordingSurface::default();
        frame_loop.start();

        controller.begin_drag(0, true, 10.0, 10.0);
        for _ in 0..5 {
            frame_loop.step(&mut controller, &mut surface);
        }
        assert_eq!(controller.state().longitude, 0.0);
    }

    #[test]
    fn fps_counter_reports_after_a_full_second() {
        let t0 = Instant::now();
        let mut fps = FpsCounter::new(t0);
        for i in 1..60 {
            fps.frame(t0 + Duration::from_millis(i * 16));
        }
        assert_eq!(fps.fps(), 0.0);
        let reported = fps.frame(t0 + Duration::from_secs(1));
        assert_abs_diff_eq!(reported, 60.0, epsilon = 0.5);
    }
}
