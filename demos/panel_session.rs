//! Example: drive a panel session against a simulated device.
//!
//! Run with: `RUST_LOG=debug cargo run --example panel_session`

use std::rc::Rc;

use futures::executor::LocalPool;
use ledpanel_core::{
    MockDevice, PanelConfig, PanelViewModel, PointerEvent, PointerHub, PointerId, PointerInput,
    SliderGeometry,
};

fn main() {
    // Initialize logging (optional)
    env_logger::init();

    let mut pool = LocalPool::new();
    let device = Rc::new(MockDevice::new());
    let hub = PointerHub::new();
    let panel = PanelViewModel::new(
        device.clone(),
        Rc::new(pool.spawner()),
        hub.clone(),
        PanelConfig::default(),
    );

    let _brightness = panel
        .state()
        .brightness
        .subscribe(|v| println!("slider: {:.1}%", v));
    let _errors = panel.state().last_error.subscribe(|e| {
        if let Some(e) = e {
            eprintln!("device error: {}", e);
        }
    });

    // Load status and effects
    panel.start();
    pool.run_until_stalled();
    println!(
        "Loaded: brightness={}, effect={:?}, power={}",
        panel.brightness_label(),
        panel.state().current_effect.get(),
        panel.state().power.get()
    );

    // Drag the slider while the device is slow to answer
    panel.set_slider_geometry(Some(SliderGeometry {
        top: 100.0,
        height: 300.0,
    }));
    device.hold_writes(true);
    panel.pointer_down(&PointerInput::Mouse { client_y: 250.0 });
    pool.run_until_stalled();
    for y in [220.0, 190.0, 160.0, 130.0] {
        hub.dispatch(&PointerEvent::Move(PointerInput::Mouse { client_y: y }));
    }
    hub.dispatch(&PointerEvent::Up(PointerId::Mouse));
    while device.release_next() {
        pool.run_until_stalled();
    }
    device.hold_writes(false);
    println!("Brightness writes sent: {:?}", device.brightness_writes());

    // Effects and power
    let effects = panel.state().effects.get();
    if let Some(effect) = effects.get(1) {
        if let Err(e) = panel.select_effect(effect) {
            eprintln!("Error selecting effect: {}", e);
        }
    }
    panel.next_effect();
    panel.toggle_power();
    pool.run_until_stalled();

    println!(
        "Device now: brightness={}%, effect={:?}, running={}",
        device.brightness(),
        device.current_effect(),
        device.is_running()
    );
}
