use crate::model::{DeviceCard, UserRow};
use dioxus::core::NoOpMutations;
use dioxus::prelude::*;

const STYLES: &str = r#"
:root {
    color-scheme: dark;
}
* { box-sizing: border-box; }
body, html {
    margin: 0;
    padding: 0;
    background: radial-gradient(circle at 20% 20%, #171a24, #0b0d13 40%), #0b0d13;
}
.page { min-height: 100vh; display: flex; justify-content: center; padding: 36px 18px; color: #e9ecf5; font-family: "Space Grotesk", "Inter", system-ui, -apple-system, sans-serif; }
.shell { width: min(900px, 100%); display: flex; flex-direction: column; gap: 12px; }
.header { display: flex; flex-wrap: wrap; align-items: center; justify-content: space-between; gap: 10px; }
.title { font-size: 26px; margin: 0; letter-spacing: 0.4px; }
.subtitle { margin: 0; color: #9aa4bc; font-size: 15px; }
.tag { display: inline-flex; align-items: center; gap: 8px; width: fit-content; padding: 8px 12px; border-radius: 999px; background: #10131c; border: 1px solid #1f2431; color: #c5cee3; font-size: 14px; }
.content { display: flex; flex-direction: column; gap: 12px; }
.card, .admin-card { width: 100%; background: linear-gradient(145deg, #161a23, #0f1219); border: 1px solid #1f2230; border-radius: 16px; padding: 22px; box-shadow: 0 18px 44px rgba(0,0,0,0.35); }
.card-title, .admin-card h2 { margin: 0 0 12px 0; font-size: 20px; }
.muted { color: #8f98ac; margin: 0; font-size: 14px; }
.field { display: flex; flex-direction: column; gap: 6px; margin-bottom: 14px; color: #c5cee3; font-size: 14px; }
.field input { padding: 12px; border-radius: 10px; border: 1px solid #262b38; background: #0f1118; color: #e9ecf5; font-size: 15px; }
.primary { width: 100%; padding: 14px 16px; border-radius: 12px; border: none; background: linear-gradient(135deg, #ff5f7a, #ff3c5a); color: #0b0d12; font-weight: 800; font-size: 16px; letter-spacing: 0.3px; box-shadow: 0 12px 30px rgba(255,79,100,0.35); cursor: pointer; }
.pill-btn { padding: 8px 10px; border-radius: 10px; border: 1px solid #262b38; background: #0f1118; color: #dfe4f3; font-weight: 700; cursor: pointer; transition: all 120ms ease; }
.pill-btn:hover { border-color: #ff90a3; color: #ffb5c2; }
.status { margin-top: 10px; color: #8f98ac; font-size: 14px; min-height: 18px; }
.status.error { color: #ff8095; }
.card-content { display: grid; grid-template-columns: repeat(auto-fit, minmax(240px, 1fr)); gap: 8px; }
.device-status-card { display: flex; align-items: center; justify-content: space-between; gap: 10px; padding: 10px 12px; border-radius: 12px; border: 1px solid #1f2230; background: #0f1218; }
.device-name { font-weight: 700; font-size: 14px; color: #f0f2fb; }
.status-indicator { display: flex; align-items: center; gap: 8px; }
.status-circle { width: 14px; height: 14px; border-radius: 50%; background: #4a5164; }
.status-circle.online { background: #3ddc84; box-shadow: 0 0 10px rgba(61,220,132,0.6); }
.status-circle.ringing { background: #ff4f64; box-shadow: 0 0 12px rgba(255,79,100,0.8); animation: pulse 0.8s infinite alternate; }
.rssi-text { font-size: 13px; color: #9aa4bc; font-variant-numeric: tabular-nums; }
@keyframes pulse { from { transform: scale(1); } to { transform: scale(1.3); } }
table { width: 100%; border-collapse: collapse; }
th, td { padding: 10px 8px; text-align: left; border-bottom: 1px solid #1f2230; font-size: 14px; }
th { color: #9aa4bc; font-weight: 700; letter-spacing: 0.3px; }
.switch { position: relative; display: inline-block; width: 44px; height: 24px; }
.switch input { opacity: 0; width: 0; height: 0; }
.slider { position: absolute; inset: 0; border-radius: 24px; background: #262b38; cursor: pointer; transition: background 140ms ease; }
.slider::before { content: ""; position: absolute; width: 18px; height: 18px; left: 3px; top: 3px; border-radius: 50%; background: #dfe4f3; transition: transform 140ms ease; }
.switch input:checked + .slider { background: #ff4f64; }
.switch input:checked + .slider::before { transform: translateX(20px); }
@media (max-width: 640px) {
    .page { padding: 20px 14px; }
    .card, .admin-card { padding: 18px; }
    .title { font-size: 22px; }
}
"#;

const ADMIN_SCRIPT: &str = r#"
(() => {
  const liveStatus = document.getElementById('live-status-content');
  const usersContent = document.getElementById('users-content');
  const status = document.getElementById('live-status');
  const scheme = location.protocol === 'https:' ? 'wss' : 'ws';

  function attachToggles(socket) {
    usersContent.querySelectorAll('input[type="checkbox"]').forEach((checkbox) => {
      checkbox.addEventListener('change', (event) => {
        socket.send(JSON.stringify({
          uid: event.target.dataset.uid,
          device: event.target.dataset.device,
          value: event.target.checked,
        }));
      });
    });
  }

  function connect() {
    const socket = new WebSocket(`${scheme}://${location.host}/ws/admin`);
    socket.addEventListener('open', () => {
      status.textContent = '';
    });
    socket.addEventListener('message', (msg) => {
      let data;
      try {
        data = JSON.parse(msg.data);
      } catch (err) {
        return;
      }
      if (data.screen === 'login') {
        location.reload();
        return;
      }
      if (data.view === 'devices') {
        liveStatus.innerHTML = data.html;
      } else if (data.view === 'users') {
        usersContent.innerHTML = data.html;
        attachToggles(socket);
      }
    });
    socket.addEventListener('close', () => {
      status.textContent = 'Conexión perdida, reintentando...';
      setTimeout(() => location.reload(), 2000);
    });
  }

  connect();
})();
"#;

fn render_dom(mut dom: VirtualDom) -> String {
    // Build the tree before rendering to avoid SSR panics.
    let mut noop = NoOpMutations {};
    let _ = dom.rebuild(&mut noop);
    dioxus_ssr::render(&dom)
}

#[derive(Props, Clone, PartialEq)]
pub struct LoginProps {
    pub error: Option<String>,
}

pub fn render_login_page(error: Option<&str>) -> String {
    render_dom(VirtualDom::new_with_props(
        LoginPage,
        LoginProps {
            error: error.map(str::to_string),
        },
    ))
}

#[component]
fn LoginPage(props: LoginProps) -> Element {
    let error = props.error.clone().unwrap_or_default();
    rsx! {
        div { class: "page",
            meta { name: "viewport", content: "width=device-width, initial-scale=1" }
            div { class: "shell",
                div { class: "header",
                    div {
                        h1 { class: "title", "Panel de administración" }
                        p { class: "subtitle", "Alarmas y permisos de acceso" }
                    }
                }
                div { id: "login-container", class: "card",
                    h2 { class: "card-title", "Iniciar sesión" }
                    form { id: "login-form", method: "post", action: "/login",
                        label { class: "field",
                            span { "Email" }
                            input {
                                id: "email",
                                name: "email",
                                r#type: "email",
                                autocomplete: "username",
                            }
                        }
                        label { class: "field",
                            span { "Contraseña" }
                            input {
                                id: "password",
                                name: "password",
                                r#type: "password",
                                autocomplete: "current-password",
                            }
                        }
                        button { class: "primary", r#type: "submit", "Entrar" }
                    }
                    p { id: "login-error", class: "status error", "{error}" }
                }
            }
        }
        style { dangerous_inner_html: STYLES }
    }
}

#[derive(Props, Clone, PartialEq)]
pub struct AdminProps {
    pub email: String,
}

pub fn render_admin_page(email: &str) -> String {
    render_dom(VirtualDom::new_with_props(
        AdminPage,
        AdminProps {
            email: email.to_string(),
        },
    ))
}

#[component]
fn AdminPage(props: AdminProps) -> Element {
    rsx! {
        div { class: "page",
            meta { name: "viewport", content: "width=device-width, initial-scale=1" }
            div { id: "admin-panel-container", class: "shell",
                div { class: "header",
                    div {
                        h1 { class: "title", "Panel de administración" }
                        div { class: "tag", "{props.email}" }
                    }
                    form { method: "post", action: "/logout",
                        button {
                            id: "logout-button",
                            class: "pill-btn",
                            r#type: "submit",
                            "Cerrar sesión"
                        }
                    }
                }
                div { id: "admin-content", class: "content",
                    div { class: "admin-card",
                        h2 { "Estado en Vivo" }
                        div { id: "live-status-content", class: "card-content" }
                    }
                    div { class: "admin-card",
                        h2 { "Usuarios" }
                        div { id: "users-content" }
                    }
                }
                div { id: "live-status", class: "status" }
            }
        }
        style { dangerous_inner_html: STYLES }
        script { dangerous_inner_html: ADMIN_SCRIPT }
    }
}

#[derive(Props, Clone, PartialEq)]
pub struct DeviceViewProps {
    pub cards: Vec<DeviceCard>,
}

pub fn render_device_view(cards: Vec<DeviceCard>) -> String {
    render_dom(VirtualDom::new_with_props(DeviceView, DeviceViewProps { cards }))
}

#[component]
fn DeviceView(props: DeviceViewProps) -> Element {
    rsx! {
        if props.cards.is_empty() {
            p { class: "muted", "Sin dispositivos" }
        }
        {props.cards.iter().map(|card| {
            let state = card.indicator.css_class();
            rsx! {
                div { key: "{card.name}", class: "device-status-card",
                    span { class: "device-name", "{card.name}" }
                    div { class: "status-indicator",
                        div { class: "status-circle {state}" }
                        span { class: "rssi-text", "{card.signal}" }
                    }
                }
            }
        })}
    }
}

#[derive(Props, Clone, PartialEq)]
pub struct UserViewProps {
    pub devices: Vec<String>,
    pub rows: Vec<UserRow>,
}

pub fn render_user_view(devices: Vec<String>, rows: Vec<UserRow>) -> String {
    render_dom(VirtualDom::new_with_props(UserView, UserViewProps { devices, rows }))
}

#[component]
fn UserView(props: UserViewProps) -> Element {
    rsx! {
        table {
            thead {
                tr {
                    th { "Usuario" }
                    {props.devices.iter().map(|device| rsx! {
                        th { key: "{device}", "{device}" }
                    })}
                }
            }
            tbody {
                {props.rows.iter().map(|row| rsx! {
                    tr { key: "{row.uid}",
                        td { "{row.label}" }
                        {row.toggles.iter().map(|toggle| rsx! {
                            td { key: "{toggle.device}",
                                label { class: "switch",
                                    input {
                                        r#type: "checkbox",
                                        checked: toggle.checked,
                                        "data-uid": "{row.uid}",
                                        "data-device": "{toggle.device}",
                                    }
                                    span { class: "slider" }
                                }
                            }
                        })}
                    }
                })}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Indicator, PermissionToggle};

    fn card(name: &str, indicator: Indicator, signal: &str) -> DeviceCard {
        DeviceCard {
            name: name.into(),
            indicator,
            signal: signal.into(),
        }
    }

    #[test]
    fn device_view_shows_state_and_signal() {
        let html = render_device_view(vec![card("Donosti", Indicator::Online, "-42 dBm")]);
        assert_eq!(html.matches("device-status-card").count(), 1);
        assert!(html.contains("Donosti"));
        assert!(html.contains("status-circle online"));
        assert!(html.contains("-42 dBm"));
    }

    #[test]
    fn device_view_renders_identically_twice() {
        let cards = vec![
            card("Donosti", Indicator::Ringing, "-50 dBm"),
            card("Lasarte", Indicator::Offline, "---"),
        ];
        assert_eq!(render_device_view(cards.clone()), render_device_view(cards));
    }

    #[test]
    fn empty_device_view_has_placeholder() {
        let html = render_device_view(Vec::new());
        assert!(html.contains("Sin dispositivos"));
        assert!(!html.contains("device-status-card"));
    }

    fn row(uid: &str, label: &str, donosti: bool, lasarte: bool) -> UserRow {
        UserRow {
            uid: uid.into(),
            label: label.into(),
            toggles: vec![
                PermissionToggle {
                    device: "Donosti".into(),
                    checked: donosti,
                },
                PermissionToggle {
                    device: "Lasarte".into(),
                    checked: lasarte,
                },
            ],
        }
    }

    fn roster() -> Vec<String> {
        vec!["Donosti".into(), "Lasarte".into()]
    }

    #[test]
    fn user_view_carries_toggle_targets() {
        let html = render_user_view(roster(), vec![row("u1", "a@x.com", true, false)]);
        assert!(html.contains("a@x.com"));
        assert!(html.contains("Usuario"));
        assert_eq!(html.matches(r#"data-uid="u1""#).count(), 2);
        assert!(html.contains(r#"data-device="Donosti""#));
        assert!(html.contains(r#"data-device="Lasarte""#));
    }

    /// Attribute text of the checkbox bound to `uid` and `device`.
    fn toggle_input<'a>(html: &'a str, uid: &str, device: &str) -> &'a str {
        let uid = format!(r#"data-uid="{uid}""#);
        let device = format!(r#"data-device="{device}""#);
        html.split("<input")
            .skip(1)
            .map(|rest| &rest[..rest.find('>').unwrap()])
            .find(|attrs| attrs.contains(&uid) && attrs.contains(&device))
            .unwrap()
    }

    #[test]
    fn each_toggle_reflects_its_own_permission() {
        let html = render_user_view(
            roster(),
            vec![row("u1", "a@x.com", true, false), row("u2", "Jon", false, true)],
        );
        assert_eq!(html.matches("<input").count(), 4);
        assert!(toggle_input(&html, "u1", "Donosti").contains("checked"));
        assert!(!toggle_input(&html, "u1", "Lasarte").contains("checked"));
        assert!(!toggle_input(&html, "u2", "Donosti").contains("checked"));
        assert!(toggle_input(&html, "u2", "Lasarte").contains("checked"));
        assert!(toggle_input(&html, "u1", "Donosti").contains(r#"type="checkbox""#));
    }

    #[test]
    fn revoked_permissions_render_unchecked() {
        let html = render_user_view(roster(), vec![row("u2", "Jon", false, false)]);
        assert!(!html.contains("checked"));
    }

    #[test]
    fn login_page_shows_error() {
        let html = render_login_page(Some("Error: Email o contraseña incorrectos."));
        assert!(html.contains("login-form"));
        assert!(html.contains("Email o contraseña incorrectos"));
    }

    #[test]
    fn admin_page_has_live_containers() {
        let html = render_admin_page("admin@x.com");
        assert!(html.contains("live-status-content"));
        assert!(html.contains("users-content"));
        assert!(html.contains("/ws/admin"));
    }
}
