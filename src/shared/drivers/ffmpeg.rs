// This is free and unencumbered software released into the public domain.

use crate::shared::{
    CameraConfig, CameraDevice, CameraError, CameraPlatform, CaptureSize, DeviceInfo, Facing,
    FrameProducer, PixelFormat, TargetSurface,
};
use bytes::Bytes;
use std::{
    borrow::Cow,
    env,
    io::Read,
    process::{Child, Command, Stdio},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Sizes assumed when the capture API offers no way to list them.
pub const COMMON_SIZES: &[CaptureSize] = &[
    CaptureSize::new(320, 240),
    CaptureSize::new(640, 480),
    CaptureSize::new(800, 600),
    CaptureSize::new(1024, 768),
    CaptureSize::new(1280, 720),
    CaptureSize::new(1280, 960),
    CaptureSize::new(1920, 1080),
];

/// Desktop cameras captured through an `ffmpeg` child process.
#[derive(Clone, Debug)]
pub struct FfmpegPlatform {
    fps: f64,
    diagnostics: bool,
}

impl FfmpegPlatform {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            fps: config.fps,
            diagnostics: config.diagnostics,
        }
    }
}

#[derive(Clone, Debug)]
struct VideoDevice {
    info: DeviceInfo,
    input: String,
}

impl CameraPlatform for FfmpegPlatform {
    fn name(&self) -> Cow<'_, str> {
        "ffmpeg".into()
    }

    fn devices(&self) -> Result<Vec<DeviceInfo>, CameraError> {
        Ok(list_video_devices()?.into_iter().map(|d| d.info).collect())
    }

    fn open_device(&self, index: usize) -> Result<Box<dyn CameraDevice>, CameraError> {
        let device = list_video_devices()?
            .into_iter()
            .find(|d| d.info.index == index)
            .ok_or_else(|| CameraError::other(format!("no video device #{index}")))?;
        let supported = list_supported_sizes(&device.input);

        tracing::debug!(
            target: "asimov_camera_holder",
            input = %device.input,
            sizes = supported.len(),
            "opened ffmpeg camera"
        );

        Ok(Box::new(FfmpegCameraDevice::new(
            index,
            device.input,
            supported,
            self.fps,
            self.diagnostics,
        )))
    }
}

pub struct FfmpegCameraDevice {
    index: usize,
    input: String,
    supported: Vec<CaptureSize>,
    current: Option<CaptureSize>,
    fps: f64,
    diagnostics: bool,
    child: Option<Child>,
    stop: Arc<AtomicBool>,
    reader_join: Option<JoinHandle<()>>,
}

impl core::fmt::Debug for FfmpegCameraDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FfmpegCameraDevice")
            .field("index", &self.index)
            .field("input", &self.input)
            .field("current", &self.current)
            .field("child", &self.child.as_ref().map(|_| "<child>"))
            .finish()
    }
}

impl FfmpegCameraDevice {
    /// A device that starts out at its first listed size, as capture
    /// drivers default to a mode before any is requested.
    fn new(
        index: usize,
        input: String,
        supported: Vec<CaptureSize>,
        fps: f64,
        diagnostics: bool,
    ) -> Self {
        Self {
            index,
            input,
            current: supported.first().copied(),
            supported,
            fps,
            diagnostics,
            child: None,
            stop: Arc::new(AtomicBool::new(false)),
            reader_join: None,
        }
    }

    /// The listed size closest to `size` by summed width and height distance.
    fn closest_listed(&self, size: CaptureSize) -> Option<CaptureSize> {
        self.supported
            .iter()
            .copied()
            .min_by_key(|s| s.width.abs_diff(size.width) + s.height.abs_diff(size.height))
    }

    fn stream_size(&self) -> Result<CaptureSize, CameraError> {
        self.current
            .ok_or_else(|| CameraError::other("no preview size configured"))
    }

    #[inline]
    fn now_ns_best_effort() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    }

    fn stop_child(&mut self) {
        if let Some(mut child) = self.child.take() {
            #[cfg(unix)]
            {
                unsafe {
                    let _ = libc::kill(child.id() as i32, libc::SIGTERM);
                }
                let start = std::time::Instant::now();
                while start.elapsed() < Duration::from_millis(900) {
                    if let Ok(Some(_)) = child.try_wait() {
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(20));
                }
            }
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl CameraDevice for FfmpegCameraDevice {
    fn index(&self) -> usize {
        self.index
    }

    fn supported_sizes(&self) -> Result<Vec<CaptureSize>, CameraError> {
        Ok(self.supported.clone())
    }

    fn set_preview_size(&mut self, size: CaptureSize) -> Result<(), CameraError> {
        if !self.supported.is_empty() && !self.supported.contains(&size) {
            if let Some(closest) = self.closest_listed(size) {
                self.current = Some(closest);
            }
            return Err(CameraError::unsupported(format!(
                "{} does not list {size}",
                self.input
            )));
        }
        self.current = Some(size);
        Ok(())
    }

    fn preview_size(&self) -> Option<CaptureSize> {
        self.current
    }

    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::Nv21
    }

    fn bind_surface(&mut self, surface: &dyn TargetSurface) -> Result<(), CameraError> {
        tracing::trace!(target: "asimov_camera_holder", surface = surface.id(), "ffmpeg renders offscreen");
        Ok(())
    }

    fn start_streaming(&mut self, producer: FrameProducer) -> Result<(), CameraError> {
        if self.child.is_some() {
            return Ok(());
        }
        let size = self.stream_size()?;

        self.stop.store(false, Ordering::Relaxed);

        let mut child = spawn_reader(&self.input, size, self.fps, self.diagnostics)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CameraError::other("ffmpeg stdout not piped"))?;

        let frame_size = PixelFormat::Nv21.frame_len(size.width, size.height);
        let stop = Arc::clone(&self.stop);

        let spawned = std::thread::Builder::new()
            .name("ffmpeg-camera".into())
            .spawn(move || {
                let mut reader = std::io::BufReader::new(stdout);

                while !stop.load(Ordering::Relaxed) {
                    let mut buf = vec![0u8; frame_size];
                    match reader.read_exact(&mut buf) {
                        Ok(()) => {
                            let ts = FfmpegCameraDevice::now_ns_best_effort();
                            if !producer.push(Bytes::from(buf), ts) {
                                break;
                            }
                        },
                        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                        Err(err) => {
                            tracing::warn!(target: "asimov_camera_holder", %err, "ffmpeg read failed");
                            break;
                        },
                    }
                }
            });
        let join = match spawned {
            Ok(join) => join,
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CameraError::driver("spawning the ffmpeg reader", err));
            },
        };

        self.reader_join = Some(join);
        self.child = Some(child);
        Ok(())
    }

    fn stop_streaming(&mut self) -> Result<(), CameraError> {
        self.stop.store(true, Ordering::Relaxed);
        self.stop_child();
        if let Some(j) = self.reader_join.take() {
            if j.join().is_err() {
                return Err(CameraError::other("ffmpeg reader panicked"));
            }
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), CameraError> {
        self.stop_streaming()
    }
}

impl Drop for FfmpegCameraDevice {
    fn drop(&mut self) {
        let _ = self.stop_streaming();
    }
}

fn spawn_reader(
    input: &str,
    size: CaptureSize,
    fps: f64,
    diagnostics: bool,
) -> Result<Child, CameraError> {
    let mut ffargs: Vec<String> = vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-nostats".into(),
        "-f".into(),
        ffmpeg_format().into(),
        "-loglevel".into(),
        "error".into(),
        "-video_size".into(),
        size.to_string(),
        "-framerate".into(),
        format!("{}", fps.round().max(1.0)),
    ];

    #[cfg(target_os = "macos")]
    {
        ffargs.push("-pixel_format".into());
        ffargs.push("0rgb".into());
    }

    ffargs.extend([
        "-i".into(),
        input.to_string(),
        "-pix_fmt".into(),
        "nv21".into(),
        "-f".into(),
        "rawvideo".into(),
        "pipe:1".into(),
    ]);

    let stderr = if diagnostics || env::var_os("ASIMOV_CAMERA_FFMPEG_STDERR").is_some() {
        Stdio::inherit()
    } else {
        Stdio::null()
    };

    Command::new("ffmpeg")
        .args(&ffargs)
        .stdout(Stdio::piped())
        .stderr(stderr)
        .spawn()
        .map_err(|e| CameraError::driver("spawning ffmpeg", e))
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "macos")] {
        fn ffmpeg_format() -> &'static str {
            "avfoundation"
        }

        fn list_video_devices() -> Result<Vec<VideoDevice>, CameraError> {
            let out = Command::new("ffmpeg")
                .args(["-hide_banner", "-f", "avfoundation", "-list_devices", "true", "-i", ""])
                .output()
                .map_err(|e| CameraError::driver("running ffmpeg -list_devices", e))?;

            let stderr = String::from_utf8_lossy(&out.stderr);
            Ok(parse_avfoundation_devices(&stderr)
                .into_iter()
                .enumerate()
                .map(|(index, (input, name))| VideoDevice {
                    info: DeviceInfo::new(index, Facing::Front, name),
                    input,
                })
                .collect())
        }

        fn list_supported_sizes(_input: &str) -> Vec<CaptureSize> {
            COMMON_SIZES.to_vec()
        }
    } else if #[cfg(target_os = "linux")] {
        fn ffmpeg_format() -> &'static str {
            "v4l2"
        }

        fn list_video_devices() -> Result<Vec<VideoDevice>, CameraError> {
            linux_video4linux_devices()
        }

        fn list_supported_sizes(input: &str) -> Vec<CaptureSize> {
            let out = Command::new("ffmpeg")
                .args(["-hide_banner", "-f", "v4l2", "-list_formats", "all", "-i", input])
                .output();
            let sizes = match out {
                Ok(out) => parse_v4l2_sizes(&String::from_utf8_lossy(&out.stderr)),
                Err(err) => {
                    tracing::warn!(target: "asimov_camera_holder", %err, "could not list v4l2 formats");
                    Vec::new()
                },
            };
            if sizes.is_empty() {
                COMMON_SIZES.to_vec()
            } else {
                sizes
            }
        }
    } else if #[cfg(target_os = "windows")] {
        fn ffmpeg_format() -> &'static str {
            "dshow"
        }

        fn list_video_devices() -> Result<Vec<VideoDevice>, CameraError> {
            let out = Command::new("ffmpeg")
                .args(["-hide_banner", "-f", "dshow", "-list_devices", "true", "-i", "dummy"])
                .output()
                .map_err(|e| CameraError::driver("running ffmpeg -list_devices", e))?;

            let stderr = String::from_utf8_lossy(&out.stderr);
            Ok(parse_dshow_devices(&stderr)
                .into_iter()
                .enumerate()
                .map(|(index, name)| VideoDevice {
                    info: DeviceInfo::new(index, Facing::Front, name.clone()),
                    input: format!("video={name}"),
                })
                .collect())
        }

        fn list_supported_sizes(_input: &str) -> Vec<CaptureSize> {
            COMMON_SIZES.to_vec()
        }
    } else {
        fn ffmpeg_format() -> &'static str {
            "lavfi"
        }

        fn list_video_devices() -> Result<Vec<VideoDevice>, CameraError> {
            Ok(Vec::new())
        }

        fn list_supported_sizes(_input: &str) -> Vec<CaptureSize> {
            Vec::new()
        }
    }
}

/// USB webcams point at the user; anything else (CSI sensors, capture
/// cards) is treated as back-facing.
#[cfg(target_os = "linux")]
fn linux_video4linux_devices() -> Result<Vec<VideoDevice>, CameraError> {
    use std::fs;
    use std::path::Path;

    let base = Path::new("/sys/class/video4linux");
    let mut entries: Vec<u32> = Vec::new();

    let rd = match fs::read_dir(base) {
        Ok(v) => v,
        Err(_) => return Ok(Vec::new()),
    };

    for e in rd.flatten() {
        let name = match e.file_name().to_str().map(|s| s.to_string()) {
            Some(v) => v,
            None => continue,
        };
        let Some(idx) = name.strip_prefix("video").and_then(|n| n.parse().ok()) else {
            continue;
        };
        entries.push(idx);
    }

    entries.sort_unstable();

    let mut out = Vec::new();
    for idx in entries {
        let devnode = format!("/dev/video{idx}");
        if !Path::new(&devnode).exists() {
            continue;
        }
        let sys_entry = base.join(format!("video{idx}"));
        let name = fs::read_to_string(sys_entry.join("name"))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| format!("video{idx}"));
        let facing = if linux_device_is_usb(sys_entry) {
            Facing::Front
        } else {
            Facing::Back
        };
        out.push(VideoDevice {
            info: DeviceInfo::new(out.len(), facing, name),
            input: devnode,
        });
    }

    Ok(out)
}

#[cfg(target_os = "linux")]
fn linux_device_is_usb(sys_entry: std::path::PathBuf) -> bool {
    use std::fs;

    let device_link = sys_entry.join("device");
    let mut p = match fs::read_link(&device_link) {
        Ok(p) => p,
        Err(_) => return false,
    };

    if !p.is_absolute() {
        p = sys_entry.join(p);
    }

    if let Ok(canon) = p.canonicalize() {
        p = canon;
    }

    p.to_string_lossy().contains("/usb")
}

/// Sizes from `ffmpeg -f v4l2 -list_formats all` output, first occurrence
/// order, without duplicates.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_v4l2_sizes(s: &str) -> Vec<CaptureSize> {
    let mut sizes: Vec<CaptureSize> = Vec::new();
    for line in s.lines() {
        if !(line.contains("Raw") || line.contains("Compressed")) {
            continue;
        }
        let Some((_, tail)) = line.rsplit_once(" : ") else {
            continue;
        };
        for token in tail.split_whitespace() {
            if let Ok(size) = token.parse::<CaptureSize>() {
                if !sizes.contains(&size) {
                    sizes.push(size);
                }
            }
        }
    }
    sizes
}

/// `(input, name)` pairs from `ffmpeg -f avfoundation -list_devices true`.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn parse_avfoundation_devices(s: &str) -> Vec<(String, String)> {
    let mut devices = Vec::new();
    let mut in_video = false;

    for line in s.lines() {
        if line.contains("AVFoundation video devices:") {
            in_video = true;
            continue;
        }
        if line.contains("AVFoundation audio devices:") {
            break;
        }
        if !in_video {
            continue;
        }

        let Some(pos) = line.find("] [") else { continue };
        let tail = line[pos + 2..].trim();
        let Some(end_bracket) = tail.find(']') else { continue };

        let idx: u32 = match tail[1..end_bracket].trim().parse() {
            Ok(v) => v,
            Err(_) => continue,
        };

        let name = tail[end_bracket + 1..].trim();
        if name.is_empty() {
            continue;
        }

        devices.push((idx.to_string(), name.to_string()));
    }

    devices
}

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn parse_dshow_devices(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut in_video = false;

    for line in s.lines() {
        if line.contains("DirectShow video devices") {
            in_video = true;
            continue;
        }
        if in_video && line.contains("DirectShow audio devices") {
            break;
        }
        if !in_video {
            continue;
        }

        let l = line.split_once("] ").map_or(line, |(_, tail)| tail).trim();
        let Some(rest) = l.strip_prefix('"') else { continue };
        let Some(end) = rest.find('"') else { continue };
        if end > 0 {
            out.push(rest[..end].to_string());
        }
    }

    out
}
