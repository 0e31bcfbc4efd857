// lifecycle.rs — one viewing session per city: load, show, tear down

use crate::asset::FetchTicket;
use crate::error::ViewerError;
use crate::frame_loop::{FrameLoop, RenderSurface};
use crate::listeners::{ListenerGuard, ListenerKind, ListenerRegistry};
use crate::orientation::OrientationController;
use image::RgbaImage;
use std::time::{Duration, Instant};

/// Builds the per-city render surface once its panorama has arrived.
pub trait SurfaceFactory {
    type Surface: RenderSurface;

    fn create(
        &mut self,
        panorama: RgbaImage,
        fov_deg: f32,
        size: (u32, u32),
    ) -> Result<Self::Surface, ViewerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerPhase {
    Down,
    Move,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub phase: PointerPhase,
    pub pointer_id: u64,
    pub is_primary: bool,
    pub x: f32,
    pub y: f32,
}

impl PointerEvent {
    fn listener(&self) -> ListenerKind {
        match self.phase {
            PointerPhase::Down => ListenerKind::PointerDown,
            PointerPhase::Move => ListenerKind::PointerMove,
            PointerPhase::Up => ListenerKind::PointerUp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewPhase {
    Idle,
    Loading { city: String },
    Ready { city: String },
    Failed { city: String, reason: String },
    TornDown,
}

impl ViewPhase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            ViewPhase::Idle => PhaseKind::Idle,
            ViewPhase::Loading { .. } => PhaseKind::Loading,
            ViewPhase::Ready { .. } => PhaseKind::Ready,
            ViewPhase::Failed { .. } => PhaseKind::Failed,
            ViewPhase::TornDown => PhaseKind::TornDown,
        }
    }

    pub fn city(&self) -> Option<&str> {
        match self {
            ViewPhase::Loading { city }
            | ViewPhase::Ready { city }
            | ViewPhase::Failed { city, .. } => Some(city),
            ViewPhase::Idle | ViewPhase::TornDown => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Idle,
    Loading,
    Ready,
    Failed,
    TornDown,
}

/// Everything that exists only while a city is Ready.
struct LiveScene<S> {
    surface: S,
    listeners: Vec<ListenerGuard>,
}

pub struct ViewLifecycle<F: SurfaceFactory> {
    factory: F,
    controller: OrientationController,
    frame_loop: FrameLoop,
    registry: ListenerRegistry,
    phase: ViewPhase,
    history: Vec<PhaseKind>,
    generation: u64,
    live: Option<LiveScene<F::Surface>>,
    loading_since: Option<Instant>,
    fetch_timeout: Option<Duration>,
    size: (u32, u32),
}

impl<F: SurfaceFactory> ViewLifecycle<F> {
    pub fn new(factory: F, controller: OrientationController, size: (u32, u32)) -> Self {
        Self {
            factory,
            controller,
            frame_loop: FrameLoop::new(),
            registry: ListenerRegistry::new(),
            phase: ViewPhase::Idle,
            history: vec![PhaseKind::Idle],
            generation: 0,
            live: None,
            loading_since: None,
            fetch_timeout: None,
            size,
        }
    }

    /// Give up on fetches that take longer than `timeout`. See [`Self::poll_timeout`].
    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn phase(&self) -> &ViewPhase {
        &self.phase
    }

    pub fn history(&self) -> &[PhaseKind] {
        &self.history
    }

    pub fn controller(&self) -> &OrientationController {
        &self.controller
    }

    #[cfg(test)]
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.registry
    }

    pub fn surface(&self) -> Option<&F::Surface> {
        self.live.as_ref().map(|l| &l.surface)
    }

    #[cfg(test)]
    pub fn factory_mut(&mut self) -> &mut F {
        &mut self.factory
    }

    pub fn is_rendering(&self) -> bool {
        self.frame_loop.is_running()
    }

    fn enter(&mut self, phase: ViewPhase) {
        log::info!("view: {:?} -> {:?}", self.phase.kind(), phase.kind());
        self.history.push(phase.kind());
        self.phase = phase;
    }

    /// Starts loading `city`, tearing down whatever was showing first.
    ///
    /// The returned ticket must accompany the fetch result handed back to
    /// [`Self::asset_resolved`].
    pub fn show_city(&mut self, city: &str) -> FetchTicket {
        self.teardown();

        self.generation += 1;
        self.loading_since = Some(Instant::now());
        self.enter(ViewPhase::Loading {
            city: city.to_string(),
        });

        FetchTicket {
            generation: self.generation,
            city: city.to_string(),
        }
    }

    fn is_current(&self, ticket: &FetchTicket) -> bool {
        ticket.generation == self.generation
            && matches!(&self.phase, ViewPhase::Loading { city } if *city == ticket.city)
    }

    /// Applies a finished fetch. Returns `false` if the result was stale and dropped.
    pub fn asset_resolved(&mut self, ticket: &FetchTicket, panorama: Option<RgbaImage>) -> bool {
        if !self.is_current(ticket) {
            log::debug!(
                "discarding panorama for '{}' (generation {}, current {})",
                ticket.city,
                ticket.generation,
                self.generation
            );
            return false;
        }
        self.loading_since = None;

        let Some(panorama) = panorama else {
            let err = ViewerError::AssetUnavailable {
                city: ticket.city.clone(),
            };
            self.fail(&ticket.city, &err);
            return true;
        };

        let fov = self.controller.view().field_of_view;
        match self.factory.create(panorama, fov, self.size) {
            Ok(surface) => {
                let listeners = ListenerKind::ALL
                    .iter()
                    .map(|k| self.registry.register(*k))
                    .collect();
                self.live = Some(LiveScene { surface, listeners });
                self.frame_loop.start();
                self.enter(ViewPhase::Ready {
                    city: ticket.city.clone(),
                });
            }
            Err(err) => self.fail(&ticket.city, &err),
        }
        true
    }

    fn fail(&mut self, city: &str, err: &ViewerError) {
        log::warn!("3D view for '{city}' failed: {err}");
        self.enter(ViewPhase::Failed {
            city: city.to_string(),
            reason: err.to_string(),
        });
    }

    /// Fails a fetch that has been pending longer than the configured timeout.
    pub fn poll_timeout(&mut self, now: Instant) -> bool {
        let (Some(timeout), Some(since)) = (self.fetch_timeout, self.loading_since) else {
            return false;
        };
        if now.duration_since(since) < timeout {
            return false;
        }
        let Some(city) = self.phase.city().map(str::to_string) else {
            return false;
        };

        // Any late result now carries an outdated generation.
        self.generation += 1;
        self.loading_since = None;
        let err = ViewerError::AssetUnavailable { city: city.clone() };
        log::warn!("panorama fetch for '{city}' timed out after {timeout:?}");
        self.fail(&city, &err);
        true
    }

    /// Stops the loop, drops every listener and disposes the surface.
    /// Safe to call any number of times.
    pub fn teardown(&mut self) {
        match self.phase.kind() {
            PhaseKind::Idle | PhaseKind::TornDown => return,
            PhaseKind::Loading | PhaseKind::Ready | PhaseKind::Failed => {}
        }

        if self.frame_loop.is_running() {
            log::debug!("frame loop stopped after {} frames", self.frame_loop.frames());
        }
        self.frame_loop.stop();
        self.generation += 1;
        self.loading_since = None;

        if let Some(mut live) = self.live.take() {
            for guard in &mut live.listeners {
                guard.release();
            }
            live.surface.dispose();
        }

        self.controller.cancel_drag();
        self.enter(ViewPhase::TornDown);
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.size = (width, height);
        if !self.registry.is_registered(ListenerKind::Resize) {
            return;
        }
        if let Some(live) = self.live.as_mut() {
            live.surface.resize(width, height);
        }
    }

    /// Routes a pointer event to the orientation controller if its listener is live.
    pub fn dispatch_pointer(&mut self, event: PointerEvent) {
        if !self.registry.is_registered(event.listener()) {
            log::trace!("no listener for {:?}, dropping", event.phase);
            return;
        }
        match event.phase {
            PointerPhase::Down => {
                self.controller
                    .begin_drag(event.pointer_id, event.is_primary, event.x, event.y)
            }
            PointerPhase::Move => self.controller.update_drag(event.pointer_id, event.x, event.y),
            PointerPhase::Up => {
                if event.is_primary {
                    self.controller.end_drag(event.pointer_id);
                }
            }
        }
    }

    /// Draws one frame. Returns whether another should be scheduled.
    pub fn frame(&mut self) -> bool {
        match self.live.as_mut() {
            Some(live) => self.frame_loop.step(&mut self.controller, &mut live.surface),
            None => false,
        }
    }

    fn apply_fov(&mut self, fov: f32) {
        if let Some(live) = self.live.as_mut() {
            live.surface.set_field_of_view(fov);
        }
    }

    pub fn set_field_of_view(&mut self, fov: f32) -> f32 {
        let fov = self.controller.set_field_of_view(fov);
        self.apply_fov(fov);
        fov
    }

    pub fn zoom_in(&mut self) -> f32 {
        let fov = self.controller.zoom_in();
        self.apply_fov(fov);
        fov
    }

    pub fn zoom_out(&mut self) -> f32 {
        let fov = self.controller.zoom_out();
        self.apply_fov(fov);
        fov
    }

    pub fn toggle_auto_rotate(&mut self) -> bool {
        self.controller.toggle_auto_rotate()
    }

    pub fn reset_view(&mut self) {
        self.controller.reset();
        let fov = self.controller.view().field_of_view;
        self.apply_fov(fov);
    }
}

impl<F: SurfaceFactory> Drop for ViewLifecycle<F> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_loop::tests::RecordingSurface;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Counters {
        created: u32,
        disposed: u32,
    }

    /// Wraps RecordingSurface so disposals stay observable after teardown drops it.
    struct TrackedSurface {
        inner: RecordingSurface,
        counters: Rc<RefCell<Counters>>,
    }

    impl RenderSurface for TrackedSurface {
        fn set_look_at(&mut self, target: glam::Vec3) {
            self.inner.set_look_at(target)
        }
        fn set_field_of_view(&mut self, fov_deg: f32) {
            self.inner.set_field_of_view(fov_deg)
        }
        fn advance_particles(&mut self) {
            self.inner.advance_particles()
        }
        fn resize(&mut self, width: u32, height: u32) {
            self.inner.resize(width, height)
        }
        fn render_frame(&mut self) {
            self.inner.render_frame()
        }
        fn dispose(&mut self) {
            self.inner.dispose();
            self.counters.borrow_mut().disposed += 1;
        }
    }

    #[derive(Default)]
    struct FakeFactory {
        counters: Rc<RefCell<Counters>>,
        unavailable: bool,
    }

    impl SurfaceFactory for FakeFactory {
        type Surface = TrackedSurface;

        fn create(
            &mut self,
            _panorama: RgbaImage,
            fov_deg: f32,
            size: (u32, u32),
        ) -> Result<TrackedSurface, ViewerError> {
            if self.unavailable {
                return Err(ViewerError::RenderSurfaceUnavailable("no adapter".into()));
            }
            self.counters.borrow_mut().created += 1;
            let mut inner = RecordingSurface::default();
            inner.fov = Some(fov_deg);
            inner.size = size;
            Ok(TrackedSurface {
                inner,
                counters: Rc::clone(&self.counters),
            })
        }
    }

    fn viewer() -> (ViewLifecycle<FakeFactory>, Rc<RefCell<Counters>>) {
        let factory = FakeFactory::default();
        let counters = Rc::clone(&factory.counters);
        let view = ViewLifecycle::new(factory, OrientationController::default(), (800, 600));
        (view, counters)
    }

    fn panorama() -> Option<RgbaImage> {
        Some(RgbaImage::new(8, 4))
    }

    fn pointer(phase: PointerPhase, x: f32, y: f32) -> PointerEvent {
        PointerEvent {
            phase,
            pointer_id: 1,
            is_primary: true,
            x,
            y,
        }
    }

    #[test]
    fn successful_load_goes_idle_loading_ready() {
        let (mut view, counters) = viewer();
        let ticket = view.show_city("Kyoto");
        assert_eq!(view.phase().kind(), PhaseKind::Loading);

        assert!(view.asset_resolved(&ticket, panorama()));
        assert_eq!(view.history(), &[PhaseKind::Idle, PhaseKind::Loading, PhaseKind::Ready]);
        assert_eq!(view.phase(), &ViewPhase::Ready { city: "Kyoto".into() });
        assert!(view.is_rendering());
        assert_eq!(counters.borrow().created, 1);
        assert_eq!(view.listeners().active_count(), ListenerKind::ALL.len());

        assert!(view.frame());
        assert_eq!(view.surface().unwrap().inner.frames, 1);
    }

    #[test]
    fn switching_city_mid_flight_abandons_the_old_result() {
        let (mut view, counters) = viewer();
        let kyoto = view.show_city("Kyoto");
        let osaka = view.show_city("Osaka");

        assert_eq!(view.phase(), &ViewPhase::Loading { city: "Osaka".into() });
        assert!(!view.asset_resolved(&kyoto, panorama()));
        assert_eq!(view.phase().kind(), PhaseKind::Loading);
        assert_eq!(counters.borrow().created, 0);

        assert!(view.asset_resolved(&osaka, panorama()));
        assert_eq!(view.phase(), &ViewPhase::Ready { city: "Osaka".into() });
        assert_eq!(counters.borrow().created, 1);
        assert!(!view.history()[..view.history().len() - 1].contains(&PhaseKind::Ready));
    }

    #[test]
    fn missing_panorama_fails_without_listeners() {
        let (mut view, counters) = viewer();
        let ticket = view.show_city("Atlantis");
        assert!(view.asset_resolved(&ticket, None));

        assert_eq!(view.history(), &[PhaseKind::Idle, PhaseKind::Loading, PhaseKind::Failed]);
        assert!(!view.is_rendering());
        assert!(!view.frame());
        assert_eq!(view.listeners().active_count(), 0);
        assert_eq!(counters.borrow().created, 0);
        match view.phase() {
            ViewPhase::Failed { reason, .. } => assert!(reason.contains("Atlantis")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn surface_creation_failure_lands_in_failed() {
        let (mut view, _) = viewer();
        view.factory_mut().unavailable = true;
        let ticket = view.show_city("Kyoto");
        view.asset_resolved(&ticket, panorama());

        assert_eq!(view.phase().kind(), PhaseKind::Failed);
        assert!(!view.is_rendering());
        assert_eq!(view.listeners().active_count(), 0);
    }

    #[test]
    fn teardown_twice_releases_once() {
        let (mut view, counters) = viewer();
        let ticket = view.show_city("Kyoto");
        view.asset_resolved(&ticket, panorama());

        view.teardown();
        view.teardown();

        assert_eq!(counters.borrow().disposed, 1);
        assert_eq!(view.listeners().active_count(), 0);
        assert!(!view.is_rendering());
        assert!(!view.frame());
        assert_eq!(view.phase(), &ViewPhase::TornDown);
    }

    #[test]
    fn city_change_from_ready_disposes_before_reloading() {
        let (mut view, counters) = viewer();
        let kyoto = view.show_city("Kyoto");
        view.asset_resolved(&kyoto, panorama());

        let osaka = view.show_city("Osaka");
        assert_eq!(counters.borrow().disposed, 1);
        assert_eq!(view.listeners().active_count(), 0);
        assert!(view.surface().is_none());

        view.asset_resolved(&osaka, panorama());
        assert_eq!(counters.borrow().created, 2);
        assert_eq!(view.listeners().active_count(), ListenerKind::ALL.len());
    }

    #[test]
    fn result_after_unmount_is_discarded() {
        let (mut view, counters) = viewer();
        let ticket = view.show_city("Kyoto");
        view.teardown();
        assert!(!view.asset_resolved(&ticket, panorama()));
        assert_eq!(view.phase(), &ViewPhase::TornDown);
        assert_eq!(counters.borrow().created, 0);
    }

    #[test]
    fn reselecting_a_failed_city_retries() {
        let (mut view, _) = viewer();
        let first = view.show_city("Kyoto");
        view.asset_resolved(&first, None);
        let retry = view.show_city("Kyoto");
        assert_ne!(first.generation, retry.generation);
        assert!(view.asset_resolved(&retry, panorama()));
        assert_eq!(view.phase().kind(), PhaseKind::Ready);
    }

    #[test]
    fn pointer_drag_only_reaches_a_ready_view() {
        let (mut view, _) = viewer();
        view.dispatch_pointer(pointer(PointerPhase::Down, 100.0, 100.0));
        assert!(!view.controller().is_dragging());

        let ticket = view.show_city("Kyoto");
        view.asset_resolved(&ticket, panorama());
        view.toggle_auto_rotate();

        view.dispatch_pointer(pointer(PointerPhase::Down, 100.0, 100.0));
        view.dispatch_pointer(pointer(PointerPhase::Move, 150.0, 100.0));
        assert!((view.controller().state().longitude - -5.0).abs() < 1e-5);

        view.dispatch_pointer(PointerEvent {
            is_primary: false,
            ..pointer(PointerPhase::Up, 150.0, 100.0)
        });
        assert!(view.controller().is_dragging());
        view.dispatch_pointer(pointer(PointerPhase::Up, 150.0, 100.0));
        assert!(!view.controller().is_dragging());
    }

    #[test]
    fn resize_updates_surface_without_reloading() {
        let (mut view, counters) = viewer();
        let ticket = view.show_city("Kyoto");
        view.asset_resolved(&ticket, panorama());
        assert_eq!(view.surface().unwrap().inner.size, (800, 600));

        view.resize(1024, 768);
        view.resize(0, 768);
        let surface = &view.surface().unwrap().inner;
        assert_eq!(surface.size, (1024, 768));
        assert_eq!(surface.resizes, 1);
        assert_eq!(counters.borrow().created, 1);
        assert_eq!(view.phase().kind(), PhaseKind::Ready);
    }

    #[test]
    fn resize_while_loading_sizes_the_new_surface() {
        let (mut view, _) = viewer();
        let ticket = view.show_city("Kyoto");
        view.resize(1024, 768);
        assert!(view.surface().is_none());

        view.asset_resolved(&ticket, panorama());
        let surface = &view.surface().unwrap().inner;
        assert_eq!(surface.size, (1024, 768));
        assert_eq!(surface.resizes, 0);
    }

    #[test]
    fn zoom_reaches_the_live_camera() {
        let (mut view, _) = viewer();
        let ticket = view.show_city("Kyoto");
        view.set_field_of_view(50.0);
        view.asset_resolved(&ticket, panorama());
        assert_eq!(view.surface().unwrap().inner.fov, Some(50.0));

        view.zoom_in();
        assert_eq!(view.surface().unwrap().inner.fov, Some(40.0));
        assert_eq!(view.set_field_of_view(20.0), 30.0);
        assert_eq!(view.set_field_of_view(150.0), 100.0);
        assert_eq!(view.surface().unwrap().inner.fov, Some(100.0));
    }

    #[test]
    fn stalled_fetch_times_out_and_late_result_is_ignored() {
        let factory = FakeFactory::default();
        let mut view = ViewLifecycle::new(factory, OrientationController::default(), (800, 600))
            .with_fetch_timeout(Some(Duration::from_secs(30)));
        let ticket = view.show_city("Kyoto");

        assert!(!view.poll_timeout(Instant::now()));
        assert!(view.poll_timeout(Instant::now() + Duration::from_secs(31)));
        assert_eq!(view.phase().kind(), PhaseKind::Failed);

        assert!(!view.asset_resolved(&ticket, panorama()));
        assert_eq!(view.phase().kind(), PhaseKind::Failed);
    }
}
