//! Symphonia decode backend
//!
//! Each load spawns a decode thread that owns the format reader and codec.
//! The backend talks to it over a command channel and reads progress from a
//! shared status. Decoded audio goes to an [`AudioSink`] as interleaved f32;
//! a device sink blocks while its buffer is full, which paces decoding.

use crate::backend::{BackendStatus, DecodeBackend, LoadRequest};
use crate::error::{PlaybackError, Result};
use crate::source::ChunkSource;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError};
use orb_buffer::{BufferError, ChunkCache, HttpRangeFetcher};
use orb_core::AudioFormat;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Consecutive undecodable packets tolerated before the track is abandoned
const MAX_DECODE_FAILURES: usize = 10;

/// Fraction of the stream held locally, in `[0, 1]`
pub type BufferedLevel = Arc<dyn Fn() -> f32 + Send + Sync>;

/// Destination for decoded audio
pub trait AudioSink: Send + 'static {
    /// Queue interleaved samples; may block until there is room
    fn write(&mut self, samples: &[f32], channels: usize, sample_rate: u32);

    /// Discard queued samples
    fn flush(&mut self) {}
}

/// A byte source ready for probing
pub struct OpenedStream {
    pub source: Box<dyn MediaSource>,
    /// `None` when the whole stream is already local
    pub buffered: Option<BufferedLevel>,
}

/// Turns a load request into a byte source
///
/// Called on the decode thread, so blocking is fine.
pub trait StreamOpener: Send + Sync + 'static {
    fn open(&self, request: &LoadRequest) -> Result<OpenedStream>;
}

impl<F> StreamOpener for F
where
    F: Fn(&LoadRequest) -> Result<OpenedStream> + Send + Sync + 'static,
{
    fn open(&self, request: &LoadRequest) -> Result<OpenedStream> {
        self(request)
    }
}

/// Opens the request URL through a chunk cache over HTTP range requests
#[derive(Debug, Clone)]
pub struct HttpOpener {
    runtime: Handle,
}

impl HttpOpener {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl StreamOpener for HttpOpener {
    fn open(&self, request: &LoadRequest) -> Result<OpenedStream> {
        let fetcher = HttpRangeFetcher::for_url(&request.url, request.auth_token.clone())
            .map_err(buffer_error)?;
        let info = self
            .runtime
            .block_on(fetcher.probe())
            .map_err(buffer_error)?;

        let cache = ChunkCache::new(fetcher, info.total_size);
        let fill = cache.clone();
        Ok(OpenedStream {
            source: Box::new(ChunkSource::new(cache, self.runtime.clone())),
            buffered: Some(Arc::new(move || fill.buffered_fraction() as f32)),
        })
    }
}

enum Command {
    Play,
    Pause,
    Seek(Duration),
    Gain(f32),
    Stop,
}

/// Handle to the decode thread of the loaded track
struct Session {
    commands: Sender<Command>,
    status: Arc<Mutex<BackendStatus>>,
    buffered: Option<BufferedLevel>,
}

impl Session {
    fn send(&self, command: Command) {
        // The thread exits on its own after an unrecoverable error
        let _ = self.commands.send(command);
    }
}

/// Decoder backend built on Symphonia
pub struct SymphoniaBackend {
    opener: Arc<dyn StreamOpener>,
    sink: Arc<Mutex<Box<dyn AudioSink>>>,
    max_bit_depth: Option<u8>,
    gain: f32,
    session: Option<Session>,
}

impl SymphoniaBackend {
    pub fn new(opener: impl StreamOpener, sink: impl AudioSink) -> Self {
        let sink: Box<dyn AudioSink> = Box::new(sink);
        Self {
            opener: Arc::new(opener),
            sink: Arc::new(Mutex::new(sink)),
            max_bit_depth: None,
            gain: 1.0,
            session: None,
        }
    }

    /// Backend streaming over HTTP, blocking on `runtime` for each chunk
    pub fn http(runtime: Handle, sink: impl AudioSink) -> Self {
        Self::new(HttpOpener::new(runtime), sink)
    }

    /// Refuse streams deeper than `bits` with `DecodeUnavailable`
    ///
    /// For a high-resolution instance on an output that tops out below the
    /// stream; the adapter then falls back to the native instance.
    #[must_use]
    pub fn with_max_bit_depth(mut self, bits: u8) -> Self {
        self.max_bit_depth = Some(bits);
        self
    }

    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(PlaybackError::NoTrackLoaded)
    }
}

impl DecodeBackend for SymphoniaBackend {
    fn load(&mut self, request: &LoadRequest) -> Result<()> {
        self.stop();

        if let (Some(max), Some(depth)) = (self.max_bit_depth, request.bit_depth) {
            if depth > max {
                return Err(PlaybackError::DecodeUnavailable(format!(
                    "{}-bit output not supported (max {})",
                    depth, max
                )));
            }
        }

        let (ready_tx, ready_rx) = bounded(1);
        let (commands, command_rx) = unbounded();
        let status = Arc::new(Mutex::new(BackendStatus {
            position: request.start_offset,
            ..BackendStatus::default()
        }));

        let opener = Arc::clone(&self.opener);
        let sink = Arc::clone(&self.sink);
        let thread_status = Arc::clone(&status);
        let thread_request = request.clone();
        let gain = self.gain;
        thread::Builder::new()
            .name("orb-decode".to_string())
            .spawn(move || {
                let opened = opener.open(&thread_request).and_then(|opened| {
                    let buffered = opened.buffered.clone();
                    TrackDecoder::open(opened, &thread_request).map(|track| (track, buffered))
                });
                match opened {
                    Ok((track, buffered)) => {
                        let _ = ready_tx.send(Ok((track.duration, buffered)));
                        track.run(&command_rx, &thread_status, &sink, gain);
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                    }
                }
            })
            .map_err(|e| PlaybackError::Backend(format!("Failed to start decoder: {}", e)))?;

        let (duration, buffered) = ready_rx
            .recv()
            .map_err(|_| PlaybackError::Backend("Decoder exited during load".to_string()))??;
        status.lock().duration = duration;

        debug!(url = %request.url, duration = ?duration, "Stream opened");
        self.session = Some(Session {
            commands,
            status,
            buffered,
        });
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.session()?.send(Command::Play);
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.session()?.send(Command::Pause);
        Ok(())
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        let session = self.session()?;
        {
            let mut status = session.status.lock();
            status.position = position;
            status.finished = false;
        }
        session.send(Command::Seek(position));
        Ok(())
    }

    fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
        if let Some(session) = &self.session {
            session.send(Command::Gain(gain));
        }
    }

    fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.send(Command::Stop);
        }
    }

    fn status(&self) -> BackendStatus {
        let Some(session) = &self.session else {
            return BackendStatus::default();
        };
        let mut status = *session.status.lock();
        status.buffered = session.buffered.as_ref().map_or(1.0, |level| level());
        status
    }
}

impl Drop for SymphoniaBackend {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Chunk {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
    /// Track time at the end of the chunk
    end: Duration,
}

/// Format reader and codec for one track, owned by the decode thread
struct TrackDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
    duration: Option<Duration>,
}

impl TrackDecoder {
    fn open(opened: OpenedStream, request: &LoadRequest) -> Result<Self> {
        let mss = MediaSourceStream::new(opened.source, Default::default());

        let mut hint = Hint::new();
        if request.format != AudioFormat::Other {
            hint.with_extension(request.format.as_str());
        }

        let format_options = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };
        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_options, &MetadataOptions::default())
            .map_err(|e| match e {
                // Ran out of bytes without finding a known container
                SymphoniaError::IoError(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                    PlaybackError::DecodeUnavailable("Unrecognized stream".to_string())
                }
                other => symphonia_error("Failed to probe stream", other),
            })?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| PlaybackError::DecodeUnavailable("No audio track".to_string()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| symphonia_error("Failed to create decoder", e))?;

        let track_id = track.id;
        let params = &track.codec_params;
        let time_base = params
            .time_base
            .or_else(|| params.sample_rate.map(|rate| TimeBase::new(1, rate)));
        let duration = match (time_base, params.n_frames) {
            (Some(time_base), Some(frames)) => Some(to_duration(time_base.calc_time(frames))),
            _ => None,
        };

        let mut track = Self {
            track_id,
            format,
            decoder,
            time_base,
            duration,
        };
        if !request.start_offset.is_zero() {
            track.seek(request.start_offset)?;
        }
        Ok(track)
    }

    fn run(
        mut self,
        commands: &Receiver<Command>,
        status: &Mutex<BackendStatus>,
        sink: &Mutex<Box<dyn AudioSink>>,
        mut gain: f32,
    ) {
        let mut playing = false;
        let mut finished = false;

        loop {
            let command = if playing && !finished {
                match commands.try_recv() {
                    Ok(command) => Some(command),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => break,
                }
            } else {
                match commands.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                }
            };

            match command {
                Some(Command::Play) => playing = true,
                Some(Command::Pause) => {
                    playing = false;
                    sink.lock().flush();
                }
                Some(Command::Gain(value)) => gain = value,
                Some(Command::Seek(position)) => match self.seek(position) {
                    Ok(actual) => {
                        finished = false;
                        sink.lock().flush();
                        let mut status = status.lock();
                        status.position = actual;
                        status.finished = false;
                    }
                    Err(err) => warn!(error = %err, "Seek failed"),
                },
                Some(Command::Stop) => {
                    sink.lock().flush();
                    break;
                }
                None => match self.next_chunk() {
                    Ok(Some(mut chunk)) => {
                        if gain != 1.0 {
                            chunk.samples.iter_mut().for_each(|s| *s *= gain);
                        }
                        sink.lock()
                            .write(&chunk.samples, chunk.channels, chunk.sample_rate);
                        status.lock().position = chunk.end;
                    }
                    Ok(None) => {
                        debug!("End of stream");
                        finished = true;
                        status.lock().finished = true;
                    }
                    Err(err) => {
                        warn!(error = %err, "Decoding stopped");
                        finished = true;
                        status.lock().finished = true;
                    }
                },
            }
        }
        debug!("Decode thread exiting");
    }

    /// Decode the next packet of our track; `None` at end of stream
    fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        let mut failures = 0;
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(None),
                Err(e) => return Err(symphonia_error("Failed to read packet", e)),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let end = self.time_at(packet.ts().saturating_add(packet.dur()));
            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    buffer.copy_interleaved_ref(decoded);
                    return Ok(Some(Chunk {
                        samples: buffer.samples().to_vec(),
                        channels: spec.channels.count(),
                        sample_rate: spec.rate,
                        end,
                    }));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    failures += 1;
                    if failures >= MAX_DECODE_FAILURES {
                        return Err(PlaybackError::Backend(format!(
                            "{} consecutive bad packets: {}",
                            failures, e
                        )));
                    }
                    warn!(error = e, "Skipping undecodable packet");
                }
                Err(e) => return Err(symphonia_error("Failed to decode packet", e)),
            }
        }
    }

    /// Seek to `position`; returns where decoding actually resumes
    fn seek(&mut self, position: Duration) -> Result<Duration> {
        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::from(position.as_secs_f64()),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| symphonia_error("Seek failed", e))?;
        self.decoder.reset();

        let actual = self.time_at(seeked.actual_ts);
        info!(requested = ?position, actual = ?actual, "Seeked");
        Ok(actual)
    }

    fn time_at(&self, ts: u64) -> Duration {
        self.time_base
            .map_or(Duration::ZERO, |time_base| to_duration(time_base.calc_time(ts)))
    }
}

fn to_duration(time: Time) -> Duration {
    Duration::from_secs(time.seconds) + Duration::from_secs_f64(time.frac.clamp(0.0, 1.0))
}

/// Unsupported containers and codecs are the caller's cue to fall back
fn symphonia_error(context: &str, err: SymphoniaError) -> PlaybackError {
    match err {
        SymphoniaError::Unsupported(what) => {
            PlaybackError::DecodeUnavailable(format!("{}: unsupported {}", context, what))
        }
        other => PlaybackError::Backend(format!("{}: {}", context, other)),
    }
}

fn buffer_error(err: BufferError) -> PlaybackError {
    PlaybackError::Backend(err.to_string())
}
