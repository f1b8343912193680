//! Micro-benchmarks for wire packet encoding
//!
//! Isolates the per-broadcast CPU cost: full-buffer canvas packets and
//! grid display metadata (including the transform decomposition).
//!
//! Run with: cargo bench --bench packet_encoding

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use gridcast_server::config::IdConfig;
use gridcast_server::geometry::{Facing, grid_cell_placement, item_display_transform};
use gridcast_server::protocol::{AdapterConfig, DisplayTransformMode, Payload, select_adapter};
use gridcast_server::server::ConnectionRegistry;
use std::sync::Arc;

fn bench_canvas_paint(c: &mut Criterion) {
    let ids = IdConfig::default();
    let adapter = select_adapter(
        "v3",
        Arc::new(ConnectionRegistry::new()),
        AdapterConfig {
            entity_ids: ids.entity_range(),
            canvas_ids: ids.canvas_range(),
            force_hitbox_top: false,
        },
        Arc::new(|_, _| {}),
    )
    .expect("adapter");

    let mut canvas = adapter.allocate_canvas();
    for y in 0..128 {
        for x in 0..128 {
            canvas.set_pixel(x, y, ((x ^ y) & 0x3F) as u8);
        }
    }

    c.bench_function("paint_canvas_v3", |b| {
        b.iter(|| adapter.paint_canvas(black_box(&canvas)));
    });
}

fn bench_grid_update(c: &mut Criterion) {
    let ids = IdConfig::default();
    let adapter = select_adapter(
        "v3",
        Arc::new(ConnectionRegistry::new()),
        AdapterConfig {
            entity_ids: ids.entity_range(),
            canvas_ids: ids.canvas_range(),
            force_hitbox_top: false,
        },
        Arc::new(|_, _| {}),
    )
    .expect("adapter");

    let (x, z) = grid_cell_placement(1, 1, Facing::South);
    let placement = item_display_transform(x, z, Facing::South);
    let payload = Payload::Item("stone".to_string());

    c.bench_function("update_grid_entity_v3", |b| {
        b.iter(|| {
            adapter
                .update_grid_entity(
                    black_box(7),
                    black_box(&placement),
                    &payload,
                    DisplayTransformMode::Gui,
                )
                .expect("grid update");
        });
    });
}

criterion_group!(benches, bench_canvas_paint, bench_grid_update);
criterion_main!(benches);
