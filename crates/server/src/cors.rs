//! CORS layer construction (spec.md §1: "outer CORS... middleware" is
//! explicitly external to the gateway's core, but still carried per the
//! ambient-stack rule).

use config::CorsConfig;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Build the CORS layer for `config`, or a permissive default when no
/// `[server.cors]` section is present.
pub fn new_layer(config: Option<&CorsConfig>) -> CorsLayer {
    let Some(config) = config else {
        return CorsLayer::permissive();
    };

    if config.allow_any {
        return CorsLayer::permissive();
    }

    let origins: Vec<_> = config
        .allow_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(tower_http::cors::Any).allow_headers(tower_http::cors::Any)
}
