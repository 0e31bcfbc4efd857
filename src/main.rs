// main.rs — window, input mapping and overlay UI for the city panorama viewer

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // no console window in release builds

mod asset;
mod config;
mod error;
mod frame_loop;
mod i18n;
mod lifecycle;
mod listeners;
mod mesh;
mod orientation;
mod particles;
mod renderer;
mod scene;

use asset::{AssetLoader, DirectorySource};
use config::ViewerConfig;
use error::ViewerResult;
use frame_loop::FpsCounter;
use lifecycle::{PhaseKind, PointerEvent, PointerPhase, ViewLifecycle, ViewPhase};
use orientation::OrientationController;
use renderer::Renderer;
use scene::WgpuSceneFactory;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    dpi::{LogicalSize, PhysicalPosition},
    event::*,
    event_loop::{ControlFlow, EventLoop},
    window::{CursorIcon, Fullscreen, Window, WindowBuilder},
};

/// The mouse is always pointer 0; touches are numbered from 1.
const MOUSE_POINTER_ID: u64 = 0;
const TOUCHPAD_FOV_PER_PIXEL: f32 = 0.1;

type CityView = ViewLifecycle<WgpuSceneFactory>;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run() -> ViewerResult<()> {
    let config = ViewerConfig::resolve()?;
    i18n::init(config.lang.clone());
    log::info!("ui language: {}", i18n::current_lang());

    let source = DirectorySource::new(config.asset_dir.clone());
    let cities = if config.cities.is_empty() {
        source.list_cities()
    } else {
        config.cities.clone()
    };
    log::info!("{} cities available from {}", cities.len(), source.dir().display());
    let loader = AssetLoader::new(Arc::new(source));

    let event_loop = EventLoop::new();
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(i18n::tr("app.title"))
            .with_inner_size(LogicalSize::new(1280, 720))
            .build(&event_loop)
            .map_err(|e| error::ViewerError::RenderSurfaceUnavailable(e.to_string()))?,
    );

    let mut renderer = pollster::block_on(Renderer::new(&window))?;
    let factory = WgpuSceneFactory::new(renderer.gpu(), config.particle_count);
    let size = (renderer.size.width, renderer.size.height);
    let mut view: CityView =
        ViewLifecycle::new(factory, OrientationController::new(config.view_config()), size)
            .with_fetch_timeout(config.fetch_timeout());

    if let Some(city) = config.initial_city.as_deref() {
        loader.request(view.show_city(city));
    }

    let asset_dir = config.asset_dir.clone();
    let mut cursor = PhysicalPosition::new(0.0f64, 0.0f64);
    let mut primary_touch: Option<u64> = None;
    let mut fps = FpsCounter::new(Instant::now());

    event_loop.run(move |event, _, control_flow| {
        while let Some((ticket, panorama)) = loader.try_recv() {
            if view.asset_resolved(&ticket, panorama) {
                window.request_redraw();
            }
        }
        if view.poll_timeout(Instant::now()) {
            window.request_redraw();
        }

        let animating = view.is_rendering() || view.phase().kind() == PhaseKind::Loading;
        *control_flow = if animating { ControlFlow::Poll } else { ControlFlow::Wait };

        match event {
            Event::WindowEvent { event, .. } => {
                window.request_redraw();

                let response = renderer.egui_state.on_event(&renderer.egui_ctx, &event);
                // Releases still go through so a drag ending over the overlay is closed.
                if response.consumed && !is_pointer_release(&event) {
                    return;
                }

                match event {
                    WindowEvent::CloseRequested => {
                        log::debug!("view history: {:?}", view.history());
                        view.teardown();
                        *control_flow = ControlFlow::Exit;
                    }

                    WindowEvent::Resized(new_size) => {
                        renderer.resize(new_size);
                        view.resize(new_size.width, new_size.height);
                    }

                    WindowEvent::ScaleFactorChanged { new_inner_size, .. } => {
                        renderer.resize(*new_inner_size);
                        view.resize(new_inner_size.width, new_inner_size.height);
                    }

                    WindowEvent::KeyboardInput { input, .. } => {
                        if input.state == ElementState::Pressed {
                            match input.virtual_keycode {
                                Some(VirtualKeyCode::Plus)
                                | Some(VirtualKeyCode::Equals)
                                | Some(VirtualKeyCode::NumpadAdd) => {
                                    view.zoom_in();
                                }
                                Some(VirtualKeyCode::Minus) | Some(VirtualKeyCode::NumpadSubtract) => {
                                    view.zoom_out();
                                }
                                Some(VirtualKeyCode::R) => {
                                    view.toggle_auto_rotate();
                                }
                                Some(VirtualKeyCode::Space) => view.reset_view(),
                                Some(VirtualKeyCode::F11) => toggle_fullscreen(&window),
                                _ => {}
                            }
                        }
                    }

                    WindowEvent::MouseInput { state, button: MouseButton::Left, .. } => {
                        let phase = match state {
                            ElementState::Pressed => PointerPhase::Down,
                            ElementState::Released => PointerPhase::Up,
                        };
                        view.dispatch_pointer(PointerEvent {
                            phase,
                            pointer_id: MOUSE_POINTER_ID,
                            is_primary: true,
                            x: cursor.x as f32,
                            y: cursor.y as f32,
                        });
                        window.set_cursor_icon(if view.controller().is_dragging() {
                            CursorIcon::Grabbing
                        } else {
                            CursorIcon::Default
                        });
                    }

                    WindowEvent::CursorMoved { position, .. } => {
                        cursor = position;
                        view.dispatch_pointer(PointerEvent {
                            phase: PointerPhase::Move,
                            pointer_id: MOUSE_POINTER_ID,
                            is_primary: true,
                            x: position.x as f32,
                            y: position.y as f32,
                        });
                    }

                    WindowEvent::Touch(touch) => {
                        let pointer_id = touch.id + 1;
                        let phase = match touch.phase {
                            TouchPhase::Started => {
                                if primary_touch.is_none() {
                                    primary_touch = Some(pointer_id);
                                }
                                PointerPhase::Down
                            }
                            TouchPhase::Moved => PointerPhase::Move,
                            TouchPhase::Ended | TouchPhase::Cancelled => PointerPhase::Up,
                        };
                        let is_primary = primary_touch == Some(pointer_id);
                        view.dispatch_pointer(PointerEvent {
                            phase,
                            pointer_id,
                            is_primary,
                            x: touch.location.x as f32,
                            y: touch.location.y as f32,
                        });
                        if phase == PointerPhase::Up && is_primary {
                            primary_touch = None;
                        }
                    }

                    WindowEvent::MouseWheel { delta, .. } => match delta {
                        MouseScrollDelta::LineDelta(_, y) => {
                            if y > 0.0 {
                                view.zoom_in();
                            } else if y < 0.0 {
                                view.zoom_out();
                            }
                        }
                        // Touchpads scroll in pixels; follow them smoothly instead of in steps.
                        MouseScrollDelta::PixelDelta(pos) => {
                            let fov = view.controller().view().field_of_view;
                            view.set_field_of_view(fov - pos.y as f32 * TOUCHPAD_FOV_PER_PIXEL);
                        }
                    },

                    _ => {}
                }
            }

            Event::RedrawRequested(_) => {
                view.frame();
                let fps_now = fps.frame(Instant::now());

                let mut actions = UiActions::default();
                let result = renderer.present(&window, view.surface(), |ctx| {
                    draw_ui(ctx, &view, &cities, fps_now, &asset_dir, &mut actions);
                });

                match result {
                    Ok(()) => {}
                    Err(wgpu::SurfaceError::Lost) => renderer.resize(renderer.size),
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        log::error!("GPU out of memory, exiting");
                        view.teardown();
                        *control_flow = ControlFlow::Exit;
                    }
                    Err(e) => log::warn!("render error: {e:?}"),
                }

                apply_actions(actions, &mut view, &loader, &window);
            }

            Event::MainEventsCleared => {
                if animating {
                    window.request_redraw();
                }
            }

            _ => {}
        }
    })
}

fn is_pointer_release(event: &WindowEvent) -> bool {
    matches!(
        event,
        WindowEvent::MouseInput { state: ElementState::Released, button: MouseButton::Left, .. }
            | WindowEvent::Touch(Touch { phase: TouchPhase::Ended | TouchPhase::Cancelled, .. })
    )
}

fn toggle_fullscreen(window: &Window) {
    if window.fullscreen().is_some() {
        window.set_fullscreen(None);
    } else {
        window.set_fullscreen(Some(Fullscreen::Borderless(None)));
    }
}

#[derive(Debug, Default)]
struct UiActions {
    select_city: Option<String>,
    zoom_in: bool,
    zoom_out: bool,
    toggle_rotate: bool,
    reset_view: bool,
}

fn apply_actions(actions: UiActions, view: &mut CityView, loader: &AssetLoader, window: &Window) {
    if let Some(city) = actions.select_city {
        loader.request(view.show_city(&city));
        window.request_redraw();
    }
    if actions.zoom_in {
        view.zoom_in();
    }
    if actions.zoom_out {
        view.zoom_out();
    }
    if actions.toggle_rotate {
        view.toggle_auto_rotate();
    }
    if actions.reset_view {
        view.reset_view();
    }
}

fn draw_ui(
    ctx: &egui::Context,
    view: &CityView,
    cities: &[String],
    fps: f32,
    asset_dir: &Path,
    actions: &mut UiActions,
) {
    let current_city = view.phase().city().map(str::to_string);

    egui::SidePanel::left("cities").resizable(false).show(ctx, |ui| {
        ui.heading(i18n::tr("panel.cities"));
        ui.separator();
        if cities.is_empty() {
            ui.label(i18n::tr_with(
                "panel.no_cities",
                &[("dir", asset_dir.display().to_string())],
            ));
        }
        egui::ScrollArea::vertical().show(ui, |ui| {
            for city in cities {
                let selected = current_city.as_deref() == Some(city.as_str());
                if ui.selectable_label(selected, city.as_str()).clicked() {
                    // Clicking the current city reloads it, which is how a failed view is retried.
                    actions.select_city = Some(city.clone());
                }
            }
        });
    });

    egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
        let controller = view.controller();
        let state = controller.state();
        ui.horizontal(|ui| {
            if let Some(city) = &current_city {
                ui.label(i18n::tr_with("status.city", &[("city", city.clone())]));
                ui.label("|");
            }
            ui.label(i18n::tr_with(
                "status.fov",
                &[("fov", format!("{:.0}", controller.view().field_of_view))],
            ));
            ui.label("|");
            ui.label(i18n::tr_with("status.lon", &[("lon", format!("{:.1}", state.longitude))]));
            ui.label("|");
            ui.label(i18n::tr_with("status.lat", &[("lat", format!("{:.1}", state.latitude))]));
            ui.label("|");
            ui.label(
                egui::RichText::new(i18n::tr_with("status.fps", &[("fps", format!("{fps:.1}"))]))
                    .color(egui::Color32::GREEN),
            );
        });
    });

    match view.phase() {
        ViewPhase::Loading { city } => {
            overlay(ctx, "loading", |ui| {
                ui.spinner();
                ui.label(egui::RichText::new(i18n::tr("overlay.loading")).color(egui::Color32::WHITE));
                ui.label(
                    egui::RichText::new(i18n::tr_with(
                        "overlay.loading_detail",
                        &[("city", city.clone())],
                    ))
                    .small()
                    .color(egui::Color32::GRAY),
                );
            });
        }
        ViewPhase::Failed { reason, .. } => {
            overlay(ctx, "failed", |ui| {
                ui.label(
                    egui::RichText::new(i18n::tr("overlay.failed")).color(egui::Color32::LIGHT_RED),
                );
                ui.label(egui::RichText::new(reason.as_str()).small().color(egui::Color32::GRAY));
            });
        }
        ViewPhase::Idle | ViewPhase::TornDown => {
            overlay(ctx, "idle", |ui| {
                ui.label(i18n::tr("overlay.pick_city"));
            });
        }
        ViewPhase::Ready { .. } => draw_controls(ctx, view, actions),
    }
}

fn overlay(ctx: &egui::Context, id: &str, add_contents: impl FnOnce(&mut egui::Ui)) {
    egui::Area::new(id.to_owned())
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .show(ctx, |ui| {
            egui::Frame::popup(ui.style()).show(ui, |ui| {
                ui.vertical_centered(add_contents);
            });
        });
}

fn draw_controls(ctx: &egui::Context, view: &CityView, actions: &mut UiActions) {
    let auto_rotate = view.controller().view().auto_rotate;

    egui::Area::new("view_controls")
        .anchor(egui::Align2::RIGHT_TOP, [-16.0, 16.0])
        .show(ctx, |ui| {
            egui::Frame::popup(ui.style()).show(ui, |ui| {
                if ui.button("+").on_hover_text(i18n::tr("button.zoom_in")).clicked() {
                    actions.zoom_in = true;
                }
                if ui.button("−").on_hover_text(i18n::tr("button.zoom_out")).clicked() {
                    actions.zoom_out = true;
                }
                ui.separator();
                let rotate_label = if auto_rotate {
                    i18n::tr("button.rotate_off")
                } else {
                    i18n::tr("button.rotate_on")
                };
                if ui.selectable_label(auto_rotate, "⟳").on_hover_text(rotate_label).clicked() {
                    actions.toggle_rotate = true;
                }
                if ui.button("⌂").on_hover_text(i18n::tr("button.reset")).clicked() {
                    actions.reset_view = true;
                }
            });
        });

    egui::Area::new("view_hint")
        .anchor(egui::Align2::CENTER_BOTTOM, [0.0, -48.0])
        .interactable(false)
        .show(ctx, |ui| {
            egui::Frame::popup(ui.style()).show(ui, |ui| {
                ui.horizontal(|ui| {
                    ui.label(i18n::tr("overlay.hint_drag"));
                    ui.label("|");
                    ui.label(i18n::tr("overlay.hint_ambience"));
                });
            });
        });
}
