use crate::domain::value_objects::{
    CaptureSource, Destination, DestinationProtocol, DeviceKind, PipelineSpec, ProcessSpec,
    StageRole, StreamConfig,
};

/// Turns a stream configuration into the external commands that implement it
pub struct PipelineSpecBuilder;

impl PipelineSpecBuilder {
    /// Build the stages for one attempt.
    ///
    /// Camera modules get two stages (rpicam-vid piped into an ffmpeg publisher);
    /// generic video devices get a single ffmpeg that does everything. Pure: the
    /// same config always yields the same spec.
    pub fn build(config: &StreamConfig) -> PipelineSpec {
        let source = config.source();
        let destination = config.destination();
        let tools = config.tools();

        match source.kind() {
            DeviceKind::CameraModule => PipelineSpec::new(vec![
                ProcessSpec::new(StageRole::Capture, &tools.capture, Self::camera_module_args(source))
                    .piped_to_next(),
                ProcessSpec::new(StageRole::Publish, &tools.ffmpeg, Self::publisher_args(destination)),
            ]),
            DeviceKind::VideoDevice => PipelineSpec::new(vec![ProcessSpec::new(
                StageRole::CaptureAndPublish,
                &tools.ffmpeg,
                Self::video_device_args(source, destination),
            )]),
        }
    }

    /// rpicam-vid: hardware H.264 to stdout, SPS/PPS inline so the muxer can join anywhere
    fn camera_module_args(source: &CaptureSource) -> Vec<String> {
        let resolution = source.resolution();
        args(&[
            "--inline",
            "--flush",
            "-t",
            "0",
            "--width",
            &resolution.width().to_string(),
            "--height",
            &resolution.height().to_string(),
            "--framerate",
            &source.fps().to_string(),
            "--codec",
            "h264",
            "--profile",
            "baseline",
            "--level",
            "4",
            "--bitrate",
            &source.bitrate_bps().to_string(),
            "--intra",
            &source.keyframe_interval().to_string(),
            "-o",
            "-",
        ])
    }

    /// ffmpeg reading raw H.264 from stdin, copying without re-encoding
    fn publisher_args(destination: &Destination) -> Vec<String> {
        let mut out = Self::ffmpeg_preamble();
        out.extend(args(&[
            "-f",
            "h264",
            "-fflags",
            "nobuffer",
            "-flags",
            "low_delay",
            "-probesize",
            "8192",
            "-analyzeduration",
            "1000000",
            "-i",
            "-",
            "-c:v",
            "copy",
        ]));
        out.extend(Self::output_args(destination));
        out
    }

    /// ffmpeg capturing from V4L2 and encoding with the configured encoder
    fn video_device_args(source: &CaptureSource, destination: &Destination) -> Vec<String> {
        let mut out = Self::ffmpeg_preamble();
        out.extend(args(&[
            "-f",
            "v4l2",
            "-input_format",
            source.input_format(),
            "-video_size",
            &source.resolution().to_string(),
            "-framerate",
            &source.fps().to_string(),
            "-i",
            &source.device().display().to_string(),
            "-c:v",
            source.encoder(),
            "-b:v",
            &format!("{}k", source.bitrate_kbps()),
            "-g",
            &source.keyframe_interval().to_string(),
        ]));
        out.extend(Self::output_args(destination));
        out
    }

    /// Newline-terminated `key=value` progress on stderr instead of `\r` stats
    fn ffmpeg_preamble() -> Vec<String> {
        args(&["-hide_banner", "-nostats", "-progress", "pipe:2"])
    }

    fn output_args(destination: &Destination) -> Vec<String> {
        match destination.protocol() {
            DestinationProtocol::RelayPush => args(&[
                "-f",
                "flv",
                "-flvflags",
                "no_duration_filesize",
                "-flush_packets",
                "1",
                destination.url(),
            ]),
            DestinationProtocol::DirectTransport => args(&[
                "-f",
                "rtp",
                "-sdp_file",
                &destination.sdp_file().display().to_string(),
                destination.url(),
            ]),
        }
    }
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
