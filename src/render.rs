//! Dashboard renderer.
//!
//! Pure projection of the current session, auth form and sync state into a
//! [`View`]. Nothing here performs I/O or mutates its inputs; callers render
//! again on every state change. Summary tiles are derived on every call and
//! never cached.

use std::fmt;

use comfy_table::{ContentArrangement, Table};

use crate::auth::{AuthFlow, AuthMode};
use crate::protocol::{Location, StatusSnapshot, VehicleRecord, VehicleState};
use crate::session::Session;
use crate::sync::SyncState;

/// What the operator sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Login(LoginView),
    Dashboard(DashboardView),
}

/// The login / registration form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginView {
    pub mode: AuthMode,
    /// Subtitle under the heading.
    pub subtitle: &'static str,
    pub submit_label: &'static str,
    pub toggle_label: &'static str,
    /// Only the registration form asks for a role.
    pub show_role_picker: bool,
    pub error: Option<String>,
}

/// Header tiles of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryTiles {
    pub connected: u64,
    pub admins_connected: u64,
    pub vehicles: usize,
}

/// One row of the vehicle table, already formatted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleRow {
    pub id: String,
    pub kind: String,
    pub owner: String,
    pub state: String,
    /// Present axes joined by `", "`; `None` when no axis is known.
    pub location: Option<String>,
}

/// The authenticated dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardView {
    /// `"<email> · <role>"`.
    pub badge: String,
    pub tiles: SummaryTiles,
    pub rows: Vec<VehicleRow>,
}

/// Render the whole client: the login form without a session, the dashboard
/// with one.
pub fn render(session: Option<&Session>, auth: &AuthFlow, sync: &SyncState) -> View {
    match session {
        None => View::Login(render_login(auth.mode(), auth.error())),
        Some(session) => View::Dashboard(render_dashboard(session, &sync.status, &sync.vehicles)),
    }
}

pub fn render_login(mode: AuthMode, error: Option<&str>) -> LoginView {
    let (subtitle, submit_label, toggle_label) = match mode {
        AuthMode::Login => ("Operator sign-in", "Sign in", "Create an account"),
        AuthMode::Register => ("New account", "Create account", "Already registered?"),
    };
    LoginView {
        mode,
        subtitle,
        submit_label,
        toggle_label,
        show_role_picker: mode == AuthMode::Register,
        error: error.map(str::to_string),
    }
}

pub fn render_dashboard(
    session: &Session,
    status: &StatusSnapshot,
    vehicles: &[VehicleRecord],
) -> DashboardView {
    DashboardView {
        badge: format!("{} · {}", session.user.email, session.user.role),
        tiles: SummaryTiles {
            connected: status.connected_count,
            admins_connected: status.admin_connected_count,
            vehicles: vehicles.len(),
        },
        rows: vehicles.iter().map(render_vehicle).collect(),
    }
}

pub fn render_vehicle(vehicle: &VehicleRecord) -> VehicleRow {
    VehicleRow {
        id: vehicle.id.clone(),
        kind: vehicle.kind.clone(),
        owner: vehicle.owner.clone(),
        state: vehicle.state.as_ref().map(format_state).unwrap_or_default(),
        location: vehicle.location.as_ref().and_then(format_location),
    }
}

/// A ratio becomes a whole percentage, a label is shown verbatim.
pub fn format_state(state: &VehicleState) -> String {
    match state {
        VehicleState::Ratio(ratio) => format!("{}%", format_number(round_half_up(ratio * 100.0))),
        VehicleState::Label(label) => label.clone(),
    }
}

/// Present axes in x, y, z order, or `None` if there are none.
pub fn format_location(location: &Location) -> Option<String> {
    let axes: Vec<String> = location.axes().map(format_number).collect();
    if axes.is_empty() {
        None
    } else {
        Some(axes.join(", "))
    }
}

/// Round to the nearest integer, ties toward positive infinity.
fn round_half_up(x: f64) -> f64 {
    // `(x + 0.5).floor()` is off by one just below a tie.
    let floor = x.floor();
    if x - floor >= 0.5 {
        floor + 1.0
    } else {
        floor
    }
}

/// Integral values print without a fractional part.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

// ── Text output ─────────────────────────────────────────────────────

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::Login(login) => fmt::Display::fmt(login, f),
            View::Dashboard(dashboard) => fmt::Display::fmt(dashboard, f),
        }
    }
}

impl fmt::Display for LoginView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SCUM Admin")?;
        writeln!(f, "[{}]", self.subtitle)?;
        if let Some(error) = &self.error {
            writeln!(f, "error: {error}")?;
        }
        write!(f, "{} | {}", self.submit_label, self.toggle_label)
    }
}

impl fmt::Display for DashboardView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dashboard  [{}]", self.badge)?;
        writeln!(
            f,
            "Players online: {}  |  Admins online: {}  |  Vehicles listed: {}",
            self.tiles.connected, self.tiles.admins_connected, self.tiles.vehicles
        )?;

        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["ID", "Type", "Owner", "State", "Location (X,Y,Z)"]);
        for row in &self.rows {
            table.add_row(vec![
                row.id.as_str(),
                row.kind.as_str(),
                row.owner.as_str(),
                row.state.as_str(),
                row.location.as_deref().unwrap_or(""),
            ]);
        }
        write!(f, "{table}")
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::{Role, User};

    fn session() -> Session {
        Session::new(
            "T1",
            User {
                email: "a@b.com".into(),
                role: Role::Admin,
            },
        )
    }

    fn loc(x: Option<f64>, y: Option<f64>, z: Option<f64>) -> Location {
        Location { x, y, z }
    }

    #[test]
    fn ratio_renders_as_rounded_percentage() {
        let cases = [
            (0.0, "0%"),
            (0.42, "42%"),
            (1.0, "100%"),
            (0.005, "1%"),
            (0.125, "13%"),
            (0.999, "100%"),
            (0.004, "0%"),
            (0.49999999999999994 / 100.0, "0%"),
        ];
        for (ratio, expected) in cases {
            assert_eq!(format_state(&VehicleState::Ratio(ratio)), expected, "ratio {ratio}");
        }
    }

    #[test]
    fn rounding_just_below_a_tie_goes_down() {
        assert_eq!(round_half_up(0.49999999999999994), 0.0);
        assert_eq!(round_half_up(0.5), 1.0);
        assert_eq!(round_half_up(12.5), 13.0);
        assert_eq!(round_half_up(-0.5), 0.0);
    }

    #[test]
    fn label_renders_verbatim() {
        for label in ["destroyed", "", "  Parked  ", "42%"] {
            assert_eq!(format_state(&VehicleState::Label(label.into())), label);
        }
    }

    #[test]
    fn location_keeps_present_axes_in_order() {
        assert_eq!(
            format_location(&loc(Some(1.0), Some(2.0), None)).as_deref(),
            Some("1, 2")
        );
        assert_eq!(
            format_location(&loc(None, Some(-3.5), Some(0.0))).as_deref(),
            Some("-3.5, 0")
        );
        assert_eq!(
            format_location(&loc(Some(10.25), Some(20.0), Some(30.0))).as_deref(),
            Some("10.25, 20, 30")
        );
        assert_eq!(format_location(&loc(None, None, Some(7.0))).as_deref(), Some("7"));
    }

    #[test]
    fn location_without_axes_is_omitted() {
        assert_eq!(format_location(&loc(None, None, None)), None);
        let vehicle = VehicleRecord {
            id: "v1".into(),
            location: Some(Location::default()),
            ..VehicleRecord::default()
        };
        assert_eq!(render_vehicle(&vehicle).location, None);
    }

    #[test]
    fn missing_state_renders_empty() {
        let row = render_vehicle(&VehicleRecord::default());
        assert_eq!(row.state, "");
        assert_eq!(row.location, None);
    }

    #[test]
    fn dashboard_badge_and_tiles() {
        let status = StatusSnapshot {
            connected_count: 12,
            admin_connected_count: 2,
            players: vec![],
        };
        let vehicles = vec![VehicleRecord::default(), VehicleRecord::default()];
        let view = render_dashboard(&session(), &status, &vehicles);

        assert_eq!(view.badge, "a@b.com · admin");
        assert_eq!(
            view.tiles,
            SummaryTiles {
                connected: 12,
                admins_connected: 2,
                vehicles: 2,
            }
        );
        assert_eq!(view.rows.len(), 2);
    }

    #[test]
    fn login_view_depends_on_mode() {
        let login = render_login(AuthMode::Login, None);
        assert!(!login.show_role_picker);
        let register = render_login(AuthMode::Register, Some("taken"));
        assert!(register.show_role_picker);
        assert_eq!(register.error.as_deref(), Some("taken"));
        assert_ne!(login.submit_label, register.submit_label);
    }

    #[test]
    fn dashboard_text_contains_rows() {
        let vehicles = vec![VehicleRecord {
            id: "v1".into(),
            kind: "car".into(),
            owner: "p1".into(),
            state: Some(VehicleState::Ratio(0.42)),
            location: Some(loc(Some(1.0), Some(2.0), None)),
        }];
        let text = render_dashboard(&session(), &StatusSnapshot::default(), &vehicles).to_string();
        assert!(text.contains("a@b.com · admin"));
        assert!(text.contains("42%"));
        assert!(text.contains("1, 2"));
        assert!(text.contains("Vehicles listed: 1"));
    }
}
