//! Scene export
//!
//! WebGL pages built from the backend's scene JSON, the interactive HTML
//! shell served by the control server, and video output.
//!
//! Video goes through the backend encoder when it has one; otherwise each
//! time step is rendered to PNG and handed to `ffmpeg` (override the binary
//! with `LV_FFMPEG`).

use serde::Serialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

use crate::backend::{ImageFormat, ImageRequest, VideoRequest};
use crate::bridge::RenderMethod;
use crate::error::{BackendError, LavaVuError, LavaVuResult, SessionError};
use crate::session::SessionCore;

/// Escape JSON for embedding in a `<script>` element
fn script_safe(json: &str) -> String {
    json.replace("</", "<\\/")
}

/// A standalone page embedding `json` for the WebGL viewer
pub fn webgl_page(json: &str, resolution: (u32, u32), title: &str) -> String {
    let (width, height) = resolution;
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<script src="drawbox.js"></script>
</head>
<body onload="initBox(document.getElementById('canvas'), document.getElementById('data').textContent)">
<canvas id="canvas" width="{width}" height="{height}"></canvas>
<script id="data" type="application/json">{data}</script>
</body>
</html>
"#,
        title = title,
        width = width,
        height = height,
        data = script_safe(json),
    )
}

/// What the interactive shell needs to reach its session
#[derive(Clone, Debug, Serialize)]
pub struct ShellInfo {
    pub id: u64,
    pub port: Option<u16>,
    pub connected: Option<String>,
    pub resolution: (u32, u32),
}

/// The full-window interactive page
///
/// Frames come from `/image`; key and mouse input is posted back as
/// `/key=` and `/mouse=` requests.
pub fn html_shell(info: &ShellInfo) -> String {
    let config = serde_json::to_string(info).unwrap_or_else(|_| "{}".into());
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>LavaVu</title>
<link rel="stylesheet" href="control.css">
<script src="control.js"></script>
</head>
<body style="margin: 0; overflow: hidden">
<img id="frame" src="image" width="{width}" height="{height}" draggable="false">
<script>
var viewer = {config};
if (typeof initViewer === "function") initViewer(document.getElementById("frame"), viewer);
</script>
</body>
</html>
"#,
        width = info.resolution.0,
        height = info.resolution.1,
        config = script_safe(&config),
    )
}

fn video_error(message: impl Into<String>) -> LavaVuError {
    SessionError::Video {
        message: message.into(),
    }
    .into()
}

impl SessionCore {
    fn resolution(&self) -> (u32, u32) {
        self.config().resolution.unwrap_or((640, 480))
    }

    /// Write a WebGL page, `webgl.html` by default
    pub fn webgl(
        &self,
        path: Option<&Path>,
        resolution: Option<(u32, u32)>,
    ) -> LavaVuResult<PathBuf> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("webgl.html"));
        let json = self.routed(RenderMethod::Web, |b| b.web())??;
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "LavaVu".into());
        let page = webgl_page(&json, resolution.unwrap_or_else(|| self.resolution()), &title);
        fs::write(&path, page)?;
        debug!(path = %path.display(), bytes = json.len(), "webgl export");
        Ok(path)
    }

    /// The interactive page for this session
    pub fn html_shell(&self) -> String {
        html_shell(&ShellInfo {
            id: self.id(),
            port: self.server_port(),
            connected: self.connected_url(),
            resolution: self.resolution(),
        })
    }

    /// Encode all time steps at `fps` to `path`, `lavavu.mp4` by default
    pub fn video(
        &self,
        path: Option<&Path>,
        fps: u32,
        resolution: Option<(u32, u32)>,
    ) -> LavaVuResult<PathBuf> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("lavavu.mp4"));
        let fps = fps.max(1);
        let (width, height) = resolution.unwrap_or((0, 0));
        let steps = self.timesteps()?;
        let request = VideoRequest {
            path: path.clone(),
            fps,
            width,
            height,
            start: steps.first().copied().unwrap_or(0),
            end: steps.last().copied().unwrap_or(0),
            quality: 1,
        };
        let encoded = self.routed(RenderMethod::Video, move |b| b.encode_video(&request))?;
        match encoded {
            Ok(out) => Ok(out),
            Err(BackendError::Unsupported { operation }) => {
                debug!(%operation, "backend has no encoder, using ffmpeg");
                self.ffmpeg_video(&path, fps, (width, height), &steps)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn ffmpeg_video(
        &self,
        path: &Path,
        fps: u32,
        resolution: (u32, u32),
        steps: &[i32],
    ) -> LavaVuResult<PathBuf> {
        let frames = env::temp_dir().join(format!("lavavu-frames-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&frames)?;
        let result = self.render_frames(&frames, resolution, steps).and_then(|count| {
            let ffmpeg = env::var("LV_FFMPEG").unwrap_or_else(|_| "ffmpeg".into());
            info!(count, fps, path = %path.display(), "encoding frames with {}", ffmpeg);
            let output = Command::new(&ffmpeg)
                .arg("-hide_banner")
                .arg("-loglevel")
                .arg("error")
                .arg("-y")
                .arg("-framerate")
                .arg(fps.to_string())
                .arg("-i")
                .arg(frames.join("frame%05d.png"))
                .arg("-pix_fmt")
                .arg("yuv420p")
                .arg(path)
                .output()
                .map_err(|e| video_error(format!("could not run {}: {}", ffmpeg, e)))?;
            if !output.status.success() {
                return Err(video_error(String::from_utf8_lossy(&output.stderr).trim().to_string()));
            }
            Ok(path.to_path_buf())
        });
        if let Err(e) = fs::remove_dir_all(&frames) {
            warn!(dir = %frames.display(), "could not remove frames: {}", e);
        }
        result
    }

    /// One PNG per step, or a single frame without steps; returns the count
    fn render_frames(
        &self,
        dir: &Path,
        resolution: (u32, u32),
        steps: &[i32],
    ) -> LavaVuResult<usize> {
        let initial = self.timestep()?;
        let request = || ImageRequest {
            width: resolution.0,
            height: resolution.1,
            format: ImageFormat::Png,
            ..ImageRequest::default()
        };
        let mut count = 0;
        if steps.is_empty() {
            fs::write(dir.join("frame00000.png"), self.render_image(request())?)?;
            return Ok(1);
        }
        for &step in steps {
            self.set_timestep(step)?;
            fs::write(dir.join(format!("frame{:05}.png", count)), self.render_image(request())?)?;
            count += 1;
        }
        self.set_timestep(initial)?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SessionConfig, SessionMode};
    use crate::session::Session;

    #[test]
    fn test_script_tags_escaped() {
        let page = webgl_page(r#"{"label": "</script><b>"}"#, (100, 50), "t");
        assert!(page.contains(r#"<\/script><b>"#));
        assert_eq!(page.matches("</script>").count(), 2);
        assert!(page.contains(r#"width="100" height="50""#));
    }

    #[test]
    fn test_shell_embeds_port() {
        let page = html_shell(&ShellInfo {
            id: 7,
            port: Some(8123),
            connected: None,
            resolution: (320, 200),
        });
        assert!(page.contains(r#""port":8123"#));
        assert!(page.contains(r#""id":7"#));
        assert!(page.contains(r#"src="image""#));
    }

    #[test]
    fn test_webgl_export() {
        let dir = tempfile::tempdir().unwrap();
        let lv = Session::new(SessionConfig::default().with_mode(SessionMode::Direct)).unwrap();
        let pts = lv.points(Some("pts"), serde_json::Value::Null).unwrap();
        pts.vertices(vec![[0.0f32, 0.0, 0.0], [1.0, 1.0, 1.0]]).unwrap();
        let path = lv.webgl(Some(&dir.path().join("scene.html")), None).unwrap();
        let page = fs::read_to_string(path).unwrap();
        assert!(page.contains("<title>scene</title>"));
        assert!(page.contains(r#""renderer":"points""#));
    }
}
