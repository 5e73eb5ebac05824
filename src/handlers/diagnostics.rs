use axum::{extract::State, http::StatusCode, Json};
use std::sync::{Arc, Mutex, OnceLock};
use sysinfo::System;
use tracing::info;

use crate::models::DiagnosticsResponse;
use crate::state::AppState;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Runtime diagnostics: room/session/cursor/worker counts plus host load.
pub async fn diagnostics(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<DiagnosticsResponse>) {
    let (n_rooms, n_sessions) = state.registry.stats().await;
    let n_cursors = state.presence.cursor_count().await;
    let n_apply_workers = state.synchronizer.worker_count().await;
    let n_cached_identities = state
        .verifier
        .as_ref()
        .map_or(0, |v| v.cached_identities() as u32);

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| Mutex::new(System::new_all()));
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.free_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0, 0),
        }
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Rooms: {}, Sessions: {}",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        n_rooms,
        n_sessions
    );

    (
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_rooms: n_rooms as u32,
            n_sessions: n_sessions as u32,
            n_cursors: n_cursors as u32,
            n_apply_workers: n_apply_workers as u32,
            n_cached_identities,
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    )
}
