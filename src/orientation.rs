// orientation.rs — look direction inside the panorama sphere, drag sessions and zoom

use glam::Vec3;

pub const MIN_LATITUDE: f32 = -85.0;
pub const MAX_LATITUDE: f32 = 85.0;

pub const MIN_FOV: f32 = 30.0;
pub const MAX_FOV: f32 = 100.0;
pub const FOV_STEP: f32 = 10.0;
pub const DEFAULT_FOV: f32 = 75.0;

/// Degrees of rotation per pixel of pointer travel.
pub const DEFAULT_SENSITIVITY: f32 = 0.1;
/// Longitude drift in degrees per frame while auto-rotating.
pub const DEFAULT_DRIFT_RATE: f32 = 0.05;

/// Radius of the sphere the look-at point is projected onto.
pub const LOOK_AT_RADIUS: f32 = 500.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrientationState {
    /// Horizontal look angle in degrees. Unbounded.
    pub longitude: f32,
    /// Vertical look angle in degrees, kept inside [MIN_LATITUDE, MAX_LATITUDE].
    pub latitude: f32,
}

impl OrientationState {
    /// Point on a sphere of `radius` the camera should look at.
    ///
    /// phi is the polar angle measured from +Y, theta the azimuth in the XZ plane.
    pub fn look_at(&self, radius: f32) -> Vec3 {
        let phi = (90.0 - self.latitude).to_radians();
        let theta = self.longitude.to_radians();
        Vec3::new(
            radius * phi.sin() * theta.cos(),
            radius * phi.cos(),
            radius * phi.sin() * theta.sin(),
        )
    }

    fn clamp_latitude(&mut self) {
        self.latitude = self.latitude.clamp(MIN_LATITUDE, MAX_LATITUDE);
    }
}

/// Snapshot taken when the primary pointer goes down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragSession {
    pub pointer_id: u64,
    pub start_x: f32,
    pub start_y: f32,
    pub start_longitude: f32,
    pub start_latitude: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewConfig {
    pub auto_rotate: bool,
    pub field_of_view: f32,
    pub drift_rate: f32,
    pub sensitivity: f32,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            auto_rotate: true,
            field_of_view: DEFAULT_FOV,
            drift_rate: DEFAULT_DRIFT_RATE,
            sensitivity: DEFAULT_SENSITIVITY,
        }
    }
}

/// Single writer of orientation and view config. The frame loop only reads it
/// (apart from calling `tick`).
#[derive(Debug, Clone)]
pub struct OrientationController {
    state: OrientationState,
    view: ViewConfig,
    initial_fov: f32,
    drag: Option<DragSession>,
}

impl Default for OrientationController {
    fn default() -> Self {
        Self::new(ViewConfig::default())
    }
}

impl OrientationController {
    pub fn new(mut view: ViewConfig) -> Self {
        view.field_of_view = view.field_of_view.clamp(MIN_FOV, MAX_FOV);
        Self {
            state: OrientationState::default(),
            initial_fov: view.field_of_view,
            view,
            drag: None,
        }
    }

    pub fn state(&self) -> OrientationState {
        self.state
    }

    pub fn view(&self) -> ViewConfig {
        self.view
    }

    #[cfg(test)]
    pub fn drag_session(&self) -> Option<&DragSession> {
        self.drag.as_ref()
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn begin_drag(&mut self, pointer_id: u64, is_primary: bool, x: f32, y: f32) {
        if !is_primary {
            log::trace!("ignoring pointer-down from non-primary pointer {pointer_id}");
            return;
        }
        if let Some(active) = &self.drag {
            log::trace!(
                "ignoring pointer-down from {pointer_id}, pointer {} is already dragging",
                active.pointer_id
            );
            return;
        }

        self.drag = Some(DragSession {
            pointer_id,
            start_x: x,
            start_y: y,
            start_longitude: self.state.longitude,
            start_latitude: self.state.latitude,
        });
    }

    pub fn update_drag(&mut self, pointer_id: u64, x: f32, y: f32) {
        let Some(drag) = self.drag.filter(|d| d.pointer_id == pointer_id) else {
            return;
        };

        // Dragging right turns the view left, dragging down looks up.
        let k = self.view.sensitivity;
        self.state.longitude = drag.start_longitude + (drag.start_x - x) * k;
        self.state.latitude = drag.start_latitude + (y - drag.start_y) * k;
        self.state.clamp_latitude();
    }

    pub fn end_drag(&mut self, pointer_id: u64) {
        if self.drag.map_or(false, |d| d.pointer_id == pointer_id) {
            self.drag = None;
        }
    }

    /// Drops the session whatever pointer owns it, e.g. when the view goes away
    /// mid-drag and the pointer-up will never arrive.
    pub fn cancel_drag(&mut self) {
        self.drag = None;
    }

    /// Advances one frame: drift when idle, then re-clamp latitude.
    pub fn tick(&mut self) {
        if self.drag.is_none() && self.view.auto_rotate {
            self.state.longitude += self.view.drift_rate;
        }
        self.state.clamp_latitude();
    }

    pub fn look_at(&self, radius: f32) -> Vec3 {
        self.state.look_at(radius)
    }

    /// Returns the effective field of view after clamping.
    pub fn set_field_of_view(&mut self, fov: f32) -> f32 {
        self.view.field_of_view = fov.clamp(MIN_FOV, MAX_FOV);
        self.view.field_of_view
    }

    pub fn zoom_in(&mut self) -> f32 {
        self.set_field_of_view(self.view.field_of_view - FOV_STEP)
    }

    pub fn zoom_out(&mut self) -> f32 {
        self.set_field_of_view(self.view.field_of_view + FOV_STEP)
    }

    pub fn toggle_auto_rotate(&mut self) -> bool {
        self.view.auto_rotate = !self.view.auto_rotate;
        self.view.auto_rotate
    }

    /// Back to the initial look direction and zoom. Auto-rotate is left alone.
    pub fn reset(&mut self) {
        self.state = OrientationState::default();
        self.view.field_of_view = self.initial_fov;
        self.drag = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn still() -> OrientationController {
        OrientationController::new(ViewConfig {
            auto_rotate: false,
            ..ViewConfig::default()
        })
    }

    #[test]
    fn drag_right_by_fifty_pixels_turns_left_five_degrees() {
        let mut c = still();
        c.begin_drag(1, true, 100.0, 100.0);
        c.update_drag(1, 150.0, 100.0);
        assert_abs_diff_eq!(c.state().longitude, -5.0, epsilon = 1e-5);
        assert_abs_diff_eq!(c.state().latitude, 0.0);
    }

    #[test]
    fn drag_down_raises_latitude_and_clamps() {
        let mut c = still();
        c.begin_drag(1, true, 0.0, 0.0);
        c.update_drag(1, 0.0, 300.0);
        assert_abs_diff_eq!(c.state().latitude, 30.0, epsilon = 1e-5);

        c.update_drag(1, 0.0, 5000.0);
        assert_eq!(c.state().latitude, MAX_LATITUDE);
        c.update_drag(1, 0.0, -5000.0);
        assert_eq!(c.state().latitude, MIN_LATITUDE);
    }

    #[test]
    fn second_pointer_cannot_open_another_session() {
        let mut c = still();
        c.begin_drag(1, true, 10.0, 10.0);
        let before = c.state();
        c.begin_drag(2, true, 500.0, 500.0);

        assert_eq!(c.drag_session().map(|d| d.pointer_id), Some(1));
        assert_eq!(c.state(), before);

        // Pointer 2 never owned a session, so its moves go nowhere.
        c.update_drag(2, 900.0, 900.0);
        assert_eq!(c.state(), before);
    }

    #[test]
    fn non_primary_pointer_is_ignored() {
        let mut c = still();
        c.begin_drag(7, false, 0.0, 0.0);
        assert!(!c.is_dragging());
    }

    #[test]
    fn end_drag_only_closes_matching_pointer() {
        let mut c = still();
        c.begin_drag(1, true, 0.0, 0.0);
        c.end_drag(2);
        assert!(c.is_dragging());
        c.end_drag(1);
        assert!(!c.is_dragging());
    }

    #[test]
    fn drift_accumulates_per_tick() {
        let mut c = OrientationController::default();
        for _ in 0..100 {
            c.tick();
        }
        assert_abs_diff_eq!(c.state().longitude, 100.0 * DEFAULT_DRIFT_RATE, epsilon = 1e-3);
    }

    #[test]
    fn drag_suspends_drift() {
        let mut c = OrientationController::default();
        c.begin_drag(1, true, 0.0, 0.0);
        for _ in 0..10 {
            c.tick();
        }
        assert_eq!(c.state().longitude, 0.0);

        c.update_drag(1, -20.0, 0.0);
        c.tick();
        assert_abs_diff_eq!(c.state().longitude, 2.0, epsilon = 1e-5);

        c.end_drag(1);
        c.tick();
        assert_abs_diff_eq!(c.state().longitude, 2.0 + DEFAULT_DRIFT_RATE, epsilon = 1e-5);
    }

    #[test]
    fn latitude_stays_in_range_over_mixed_input() {
        let mut c = OrientationController::default();
        let moves = [(0.0, 2000.0), (30.0, -4000.0), (-80.0, 850.0), (5.0, -851.0)];
        for (i, (x, y)) in moves.iter().enumerate() {
            c.begin_drag(i as u64, true, 0.0, 0.0);
            c.update_drag(i as u64, *x, *y);
            assert!((MIN_LATITUDE..=MAX_LATITUDE).contains(&c.state().latitude));
            c.tick();
            assert!((MIN_LATITUDE..=MAX_LATITUDE).contains(&c.state().latitude));
            c.end_drag(i as u64);
        }
    }

    #[test]
    fn field_of_view_is_clamped() {
        let mut c = still();
        assert_eq!(c.set_field_of_view(20.0), 30.0);
        assert_eq!(c.set_field_of_view(150.0), 100.0);
        assert_eq!(c.set_field_of_view(60.0), 60.0);
    }

    #[test]
    fn zoom_steps_by_ten_within_bounds() {
        let mut c = still();
        assert_eq!(c.zoom_in(), 65.0);
        for _ in 0..10 {
            c.zoom_in();
        }
        assert_eq!(c.view().field_of_view, MIN_FOV);
        for _ in 0..10 {
            c.zoom_out();
        }
        assert_eq!(c.view().field_of_view, MAX_FOV);
    }

    #[test]
    fn look_at_matches_spherical_projection() {
        let level = OrientationState { longitude: 0.0, latitude: 0.0 };
        let v = level.look_at(LOOK_AT_RADIUS);
        assert_abs_diff_eq!(v.x, 500.0, epsilon = 1e-3);
        assert_abs_diff_eq!(v.y, 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(v.z, 0.0, epsilon = 1e-3);

        let up = OrientationState { longitude: 90.0, latitude: 85.0 };
        let v = up.look_at(LOOK_AT_RADIUS);
        assert!(v.y > 490.0);
        assert!(v.z > 0.0);
        assert_abs_diff_eq!(v.length(), LOOK_AT_RADIUS, epsilon = 1e-2);
    }

    #[test]
    fn reset_restores_initial_view() {
        let mut c = OrientationController::default();
        c.begin_drag(1, true, 0.0, 0.0);
        c.update_drag(1, 100.0, 100.0);
        c.zoom_in();
        c.reset();
        assert_eq!(c.state(), OrientationState::default());
        assert_eq!(c.view().field_of_view, DEFAULT_FOV);
        assert!(!c.is_dragging());
        assert!(c.view().auto_rotate);
    }
}
