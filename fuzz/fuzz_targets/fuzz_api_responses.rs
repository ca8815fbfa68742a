#![no_main]

use libfuzzer_sys::fuzz_target;
use scum_admin_client::protocol::{AuthResponse, ErrorBody, StatusSnapshot, VehiclesResponse};
use scum_admin_client::render::render_vehicle;
use scum_admin_client::ApiResponse;

fuzz_target!(|data: &[u8]| {
    let _ = serde_json::from_slice::<AuthResponse>(data);
    let _ = serde_json::from_slice::<ErrorBody>(data);
    let _ = serde_json::from_slice::<StatusSnapshot>(data);

    // Decoded vehicles must always render.
    if let Ok(resp) = serde_json::from_slice::<VehiclesResponse>(data) {
        for vehicle in &resp.vehicles {
            let _ = render_vehicle(vehicle);
        }
    }

    if let Ok(s) = std::str::from_utf8(data) {
        let _ = ApiResponse::new(500, s).error_message();
    }
});
