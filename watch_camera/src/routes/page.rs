use crate::{device::Device, overlay::escape_html, server::SharedState};
use axum::{extract::State, response::Html};
use std::fmt::Write;

const TITLE: &str = "Watch My Pet";

const STYLE: &str = r#"
body { font-family: sans-serif; margin: 2rem; }
#image-container { position: relative; display: inline-block; }
#image-container img { display: block; max-width: 640px; }
.bounding-box { position: absolute; border: 2px solid; box-sizing: border-box; }
.bounding-box-label { position: absolute; top: -1.4em; left: -2px; color: #fff; font-size: 0.8em; padding: 0 4px; }
"#;

const POLL_INTERVAL_MS: u64 = 1000;

const SCRIPT: &str = r#"
let imageSeq = null;

async function selectDevice(deviceId) {
  await fetch('/devices/select', {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify({ device_id: deviceId }),
  });
}

async function takeSnapshot() {
  await fetch('/snapshot', { method: 'POST' });
  await refreshOverlay();
}

function drawBoxes(container, boxes) {
  container.querySelectorAll('.bounding-box').forEach((el) => el.remove());
  for (const b of boxes) {
    const box = document.createElement('div');
    box.className = 'bounding-box';
    box.style.borderColor = b.color;
    box.style.left = b.left + '%';
    box.style.top = b.top + '%';
    box.style.width = b.width + '%';
    box.style.height = b.height + '%';
    const label = document.createElement('div');
    label.className = 'bounding-box-label';
    label.style.backgroundColor = b.color;
    label.textContent = b.label;
    box.appendChild(label);
    container.appendChild(box);
  }
}

async function refreshOverlay() {
  const container = document.getElementById('image-container');
  if (!container) return;
  const response = await fetch('/overlay');
  if (!response.ok) return;
  const overlay = await response.json();
  if (overlay.image_seq > 0 && overlay.image_seq !== imageSeq) {
    imageSeq = overlay.image_seq;
    const img = document.getElementById('sampled');
    img.src = '/image?seq=' + imageSeq;
    container.hidden = false;
  }
  drawBoxes(container, overlay.boxes);
}
"#;

pub async fn index(State(state): State<SharedState>) -> Html<String> {
    let body = if state.permission.allows_camera() {
        camera_section(
            &state.view.controller().list_devices(),
            state.view.image().is_some(),
            &state.view.overlay_html(),
        )
    } else {
        "<p>Permissions not granted</p>".to_string()
    };

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{title}</title><style>{STYLE}</style></head>
<body>
<h1>{title}</h1>
{body}
<script>{SCRIPT}
setInterval(refreshOverlay, {POLL_INTERVAL_MS});
refreshOverlay();</script>
</body>
</html>"#,
        title = TITLE,
    ))
}

fn camera_section(devices: &[Device], has_image: bool, overlay_html: &str) -> String {
    let mut html = String::new();

    if devices.is_empty() {
        html.push_str("<p>No cameras found</p>\n");
    } else {
        html.push_str(r#"<select id="device" onchange="selectDevice(this.value)">"#);
        html.push_str(r#"<option value="" disabled selected>Select a camera</option>"#);
        for device in devices {
            let _ = write!(
                html,
                r#"<option value="{}">{}</option>"#,
                escape_html(device.id.as_str()),
                escape_html(&device.label)
            );
        }
        html.push_str("</select>\n");
    }

    html.push_str(r#"<div><img id="preview" src="/video_feed" alt="live preview"></div>"#);
    html.push_str(r#"<button onclick="takeSnapshot()">Detect</button>"#);

    let _ = write!(
        html,
        r#"<div id="image-container"{}><img id="sampled" src="{}" alt="sampled frame">{}</div>"#,
        if has_image { "" } else { " hidden" },
        if has_image { "/image" } else { "" },
        overlay_html
    );

    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{device::PermissionState, routes::tests::test_state};

    #[tokio::test]
    async fn test_permission_denied_page() {
        let (state, _worker, _requests) = test_state(&["0"], PermissionState::Denied).await;

        let Html(page) = index(State(state)).await;
        assert!(page.contains("<h1>Watch My Pet</h1>"));
        assert!(page.contains("Permissions not granted"));
        assert!(!page.contains("/video_feed"));
    }

    #[tokio::test]
    async fn test_no_cameras_found() {
        let (state, _worker, _requests) = test_state(&[], PermissionState::Prompt).await;

        let Html(page) = index(State(state)).await;
        assert!(page.contains("No cameras found"));
        assert!(page.contains(r#"src="/video_feed""#));
    }

    #[test]
    fn test_camera_section_lists_devices() {
        let devices = vec![Device {
            id: crate::device::DeviceId::new("0"),
            label: "Camera <0>".into(),
        }];
        let html = camera_section(&devices, true, r#"<div class="bounding-box"></div>"#);

        assert!(html.contains(r#"<option value="0">Camera &lt;0&gt;</option>"#));
        assert!(html.contains(r#"<div id="image-container"><img id="sampled" src="/image""#));
        assert!(html.contains("bounding-box"));

        let html = camera_section(&devices, false, "");
        assert!(html.contains(r#"<div id="image-container" hidden>"#));
    }

    #[tokio::test]
    async fn test_page_polls_overlay() {
        let (state, _worker, _requests) = test_state(&["0"], PermissionState::Granted).await;

        let Html(page) = index(State(state)).await;
        assert!(page.contains("fetch('/overlay')"));
        assert!(page.contains("setInterval(refreshOverlay, 1000)"));
        assert!(page.contains(r#"id="image-container""#));
    }
}
