use std::collections::BTreeSet;

use anyhow::Result;
use serde::Serialize;
use tokio::process::Command;
use tracing::debug;

/// One capture node a camera can be opened from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoInput {
    pub label: String,
    pub device_path: String,
    pub formats: Vec<String>,
}

/// Lists video inputs for `--probe-cameras`, so the back and front devices can be configured.
pub async fn probe_video_inputs() -> Result<Vec<VideoInput>> {
    match list_with_v4l2().await {
        Ok(inputs) if !inputs.is_empty() => Ok(inputs),
        Ok(_) => scan_dev_nodes().await,
        Err(err) => {
            debug!("v4l2-ctl unavailable, scanning /dev: {err}");
            scan_dev_nodes().await
        }
    }
}

async fn list_with_v4l2() -> Result<Vec<VideoInput>> {
    let output = Command::new("v4l2-ctl").arg("--list-devices").output().await?;
    if !output.status.success() {
        return Ok(Vec::new());
    }

    let mut inputs = Vec::new();
    for (label, device_path) in parse_device_list(&String::from_utf8_lossy(&output.stdout)) {
        let formats = list_formats(&device_path).await.unwrap_or_default();
        inputs.push(VideoInput {
            label,
            device_path,
            formats,
        });
    }
    Ok(inputs)
}

async fn list_formats(device_path: &str) -> Result<Vec<String>> {
    let output = Command::new("v4l2-ctl")
        .args(["--list-formats-ext", "-d", device_path])
        .output()
        .await?;
    if !output.status.success() {
        return Ok(Vec::new());
    }
    Ok(parse_formats(&String::from_utf8_lossy(&output.stdout)))
}

async fn scan_dev_nodes() -> Result<Vec<VideoInput>> {
    let mut paths = Vec::new();
    let mut dir = tokio::fs::read_dir("/dev").await?;
    while let Some(entry) = dir.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("video") {
            paths.push(format!("/dev/{name}"));
        }
    }
    paths.sort();

    Ok(paths
        .into_iter()
        .map(|device_path| VideoInput {
            label: "video device".to_owned(),
            device_path,
            formats: Vec::new(),
        })
        .collect())
}

/// Pairs each `/dev/video*` node with the card name heading its group.
fn parse_device_list(listing: &str) -> Vec<(String, String)> {
    let mut label = String::new();
    let mut pairs = Vec::new();

    for raw in listing.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if raw.starts_with(' ') || raw.starts_with('\t') {
            if line.starts_with("/dev/video") && !label.is_empty() {
                pairs.push((label.clone(), line.to_owned()));
            }
        } else {
            label = line.trim_end_matches(':').to_owned();
        }
    }
    pairs
}

/// Collects the quoted fourcc names from `--list-formats-ext` output.
fn parse_formats(listing: &str) -> Vec<String> {
    let mut formats = BTreeSet::new();
    for line in listing.lines() {
        let mut quoted = line.split('\'');
        if let (Some(_), Some(value), Some(_)) = (quoted.next(), quoted.next(), quoted.next()) {
            let value = value.trim();
            if !value.is_empty() {
                formats.insert(value.to_owned());
            }
        }
    }
    formats.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::{parse_device_list, parse_formats};

    const DEVICES: &str = "\
USB2.0 HD UVC WebCam: USB2.0 HD (usb-0000:00:14.0-6):
\t/dev/video0
\t/dev/video1
\t/dev/media0

Integrated IR Camera (usb-0000:00:14.0-7):
\t/dev/video2
";

    const FORMATS: &str = "\
ioctl: VIDIOC_ENUM_FMT
\tType: Video Capture

\t[0]: 'MJPG' (Motion-JPEG, compressed)
\t\tSize: Discrete 1280x720
\t[1]: 'YUYV' (YUYV 4:2:2)
\t\tSize: Discrete 640x480
\t[2]: 'MJPG' (Motion-JPEG, compressed)
";

    #[test]
    fn groups_video_nodes_under_their_card() {
        let pairs = parse_device_list(DEVICES);
        assert_eq!(
            pairs,
            vec![
                (
                    "USB2.0 HD UVC WebCam: USB2.0 HD (usb-0000:00:14.0-6)".to_owned(),
                    "/dev/video0".to_owned()
                ),
                (
                    "USB2.0 HD UVC WebCam: USB2.0 HD (usb-0000:00:14.0-6)".to_owned(),
                    "/dev/video1".to_owned()
                ),
                (
                    "Integrated IR Camera (usb-0000:00:14.0-7)".to_owned(),
                    "/dev/video2".to_owned()
                ),
            ]
        );
    }

    #[test]
    fn ignores_nodes_without_a_heading() {
        assert!(parse_device_list("\t/dev/video0\n").is_empty());
    }

    #[test]
    fn collects_unique_sorted_formats() {
        assert_eq!(parse_formats(FORMATS), vec!["MJPG".to_owned(), "YUYV".to_owned()]);
        assert!(parse_formats("no formats here").is_empty());
    }
}
