//! Host-level tests for the ready-made writer modules.

use std::{
    thread,
    time::{Duration, Instant},
};

use matrix_kit::{
    Error, LedDevice, Matrix, ModuleConfig, PixelGrid, Result, VirtualDevice,
    writers::{LineModule, LineStyle, RamModule},
};

const ON: u8 = VirtualDevice::ON;
const OFF: u8 = VirtualDevice::OFF;

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within 5s");
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn solid_line_is_visible_when_start_returns() {
    let device = VirtualDevice::new(9, 34);
    let log = device.log();
    let mut matrix = Matrix::builder()
        .device(device)
        .module(LineModule::new(ModuleConfig::new(0, 5), 9))
        .build()
        .expect("build");

    matrix.start().expect("start");

    let grid = matrix.grid();
    for x in 0..9 {
        assert_eq!(grid.get(x, 5), Some(ON), "column {x}");
        assert_eq!(grid.get(x, 4), Some(OFF));
        assert_eq!(grid.get(x, 6), Some(OFF));
    }
    assert_eq!(log.render_count(), 1);
    assert!(matrix.writers()[0].is_static());
}

#[test]
fn dashed_line_lights_even_columns() {
    let mut matrix = Matrix::builder()
        .device(VirtualDevice::new(8, 2))
        .module(LineModule::new(ModuleConfig::new(0, 1), 8).with_style(LineStyle::Dashed))
        .build()
        .expect("build");

    matrix.start().expect("start");

    let grid = matrix.grid();
    for x in 0..8 {
        let expected = if x % 2 == 0 { ON } else { OFF };
        assert_eq!(grid.get(x, 1), Some(expected), "column {x}");
    }
}

#[test]
fn line_that_does_not_fit_clears_itself() {
    let initial = PixelGrid::filled(9, 4, ON);
    let mut matrix = Matrix::builder()
        .device(VirtualDevice::new(9, 4))
        .initial_grid(initial)
        .module(LineModule::new(ModuleConfig::new(5, 2), 9))
        .build()
        .expect("build");

    matrix.start().expect("start");

    let grid = matrix.grid();
    for x in 0..9 {
        let expected = if x >= 5 { OFF } else { ON };
        assert_eq!(grid.get(x, 2), Some(expected), "column {x}");
        assert_eq!(grid.get(x, 1), Some(ON));
    }
    assert!(matrix.writers()[0].stop_signal().is_stopped());
}

#[test]
fn ram_module_draws_digits_and_bar() {
    let _ = env_logger::builder().is_test(true).try_init();
    let probe = || -> Result<u64> { Ok(12_345_000_000) };
    let config = ModuleConfig::new(0, 0).with_refresh_interval(Duration::from_millis(10));
    let device = VirtualDevice::new(9, 11);
    let log = device.log();
    let mut matrix = Matrix::builder()
        .device(device)
        .module(RamModule::with_probe(config, probe))
        .build()
        .expect("build");

    matrix.start().expect("start");
    wait_until(|| log.render_count() >= 2);

    let grid = matrix.grid();
    // 12.35 GB: the upper bar shows > 0, > 10, > 20 and > 30.
    for y in 0..4 {
        assert_eq!(grid.get(8, y), Some(ON), "upper bar row {y}");
    }
    assert_eq!(grid.get(8, 4), Some(OFF));
    for y in 6..11 {
        assert_eq!(grid.get(0, y), Some(OFF), "lower bar row {y}");
    }
    let lit_in = |columns: core::ops::Range<usize>, rows: core::ops::Range<usize>| {
        columns
            .flat_map(|x| rows.clone().map(move |y| (x, y)))
            .any(|(x, y)| grid.get(x, y) == Some(ON))
    };
    assert!(lit_in(0..3, 0..4), "tens digit");
    assert!(lit_in(4..7, 0..4), "ones digit");
    assert!(lit_in(2..5, 7..11), "g label");
    assert!(lit_in(6..9, 7..11), "b label");

    let report = matrix.stop_within(Duration::from_secs(2)).expect("stop");
    assert_eq!(report.joined, ["RAM Module"]);
    assert_eq!(matrix.grid(), PixelGrid::filled(9, 11, OFF));
}

#[test]
fn ram_module_clears_itself_when_the_probe_fails() {
    let probe = || -> Result<u64> { Err(Error::MemoryProbe("no meminfo".to_owned())) };
    let config = ModuleConfig::new(0, 0).with_refresh_interval(Duration::from_millis(10));
    let initial = PixelGrid::filled(9, 11, ON);
    let mut matrix = Matrix::builder()
        .device(VirtualDevice::new(9, 11))
        .initial_grid(initial)
        .module(RamModule::with_probe(config, probe))
        .build()
        .expect("build");

    matrix.start().expect("start");
    wait_until(|| !matrix.writers()[0].is_alive());

    assert_eq!(matrix.grid(), PixelGrid::filled(9, 11, OFF));
    assert!(matrix.writers()[0].stop_signal().is_stopped());
    matrix.stop().expect("stop");
}

#[test]
fn ram_module_outside_the_matrix_does_not_run() {
    let probe = || -> Result<u64> { Ok(1) };
    let mut matrix = Matrix::builder()
        .device(VirtualDevice::new(9, 8))
        .module(RamModule::with_probe(ModuleConfig::new(0, 0), probe))
        .build()
        .expect("build");

    matrix.start().expect("start");
    wait_until(|| !matrix.writers()[0].is_alive());

    assert_eq!(matrix.grid(), PixelGrid::filled(9, 8, OFF));
}
