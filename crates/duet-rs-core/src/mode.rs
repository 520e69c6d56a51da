//! Routing decision between the cloud and on-device backends.

use crate::types::BackendKind;
use duet_rs_config::ConnectionMode;

/// Pick the backend for the next turn.
///
/// Offline always routes locally, even when the user asked for cloud. Local
/// availability does not influence the choice; an unusable local backend
/// surfaces as an error at generation time instead.
pub fn resolve_backend(
    mode: ConnectionMode,
    is_online: bool,
    _is_local_available: bool,
) -> BackendKind {
    match mode {
        ConnectionMode::Local => BackendKind::Local,
        ConnectionMode::Cloud | ConnectionMode::Auto if is_online => BackendKind::Cloud,
        ConnectionMode::Cloud | ConnectionMode::Auto => BackendKind::Local,
    }
}

/// Human-readable label for the mode selector.
pub fn mode_label(mode: ConnectionMode, is_online: bool) -> &'static str {
    match mode {
        ConnectionMode::Auto if is_online => "Auto (Cloud)",
        ConnectionMode::Auto => "Auto (Offline)",
        ConnectionMode::Cloud => "Cloud",
        ConnectionMode::Local => "Local",
    }
}

/// Status line shown while a turn streams on `backend`.
pub fn generating_label(backend: BackendKind) -> &'static str {
    match backend {
        BackendKind::Local => "Generating on device...",
        BackendKind::Cloud => "Generating via Cloud...",
    }
}
