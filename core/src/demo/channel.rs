//! Record/replay state machine over the demo command stream
//!
//! While recording, every event or side-effect outcome is appended behind a
//! timing block that encodes how many ticks passed since the previous command.
//! While replaying, commands are decoded one at a time: a decoded command
//! stays pending until the tick counter reaches its encoded tick, then it is
//! either dispatched as input or consumed by whoever issued the matching side
//! effect.

use std::thread::{self, ThreadId};

use serde::{Deserialize, Serialize};

use super::command::{
    Command, LongOpcode, MAX_MOUSE_COORD, MAX_TIMING_DELTA, MIN_COMMAND_BITS, MOUSE_BUTTON_RANGE,
    MOUSE_DELTA_RANGE, Opcode, TIMING_BITS,
};
use super::file::{DEMO_VERSION, DemoFile, Marker};
use super::input::InputEvent;
use crate::bits::BitBuffer;
use crate::error::{DemoError, DemoResult};

/// What the channel is doing with the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoMode {
    /// Live session, nothing captured
    Idle,
    Recording,
    Replaying,
}

/// How replay divergence (sequence and desync errors) is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesyncPolicy {
    /// Stop the replay with an error
    #[default]
    Fatal,
    /// Log a warning and carry on with benign defaults
    Tolerate,
}

/// Where a replay fast-forward stops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastForward {
    ToTick(u32),
    /// Until the host next calls [`DemoChannel::add_marker`]
    NextMarker,
}

/// Refresh information captured at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoMode {
    pub windowed: bool,
    pub refresh_rate: u8,
}

/// The demo command channel
#[derive(Debug)]
pub struct DemoChannel {
    mode: DemoMode,
    buffer: BitBuffer,
    /// Ticks elapsed in this run
    update_count: u32,
    /// Ticks accounted for in the stream so far
    last_encoded: u32,
    /// Decoded but not yet consumed
    pending: Option<Command>,
    rng_seed: u32,
    product_version: String,
    markers: Vec<Marker>,
    total_ticks: u32,
    owner: ThreadId,
    policy: DesyncPolicy,
    /// Set once a user-initiated shutdown interrupts a replay
    shutting_down: bool,
    fast_forward: Option<FastForward>,
    /// Last pointer position seen (recorded or replayed)
    pointer: (i32, i32),
    /// Whether the replayed stream has passed its loading-complete point
    loading_complete: bool,
    video_mode: Option<VideoMode>,
}

impl DemoChannel {
    fn with_mode(mode: DemoMode, rng_seed: u32, product_version: String) -> Self {
        Self {
            mode,
            buffer: BitBuffer::new(),
            update_count: 0,
            last_encoded: 0,
            pending: None,
            rng_seed,
            product_version,
            markers: Vec::new(),
            total_ticks: 0,
            owner: thread::current().id(),
            policy: DesyncPolicy::default(),
            shutting_down: false,
            fast_forward: None,
            pointer: (0, 0),
            loading_complete: false,
            video_mode: None,
        }
    }

    /// A live session that records nothing
    pub fn idle(rng_seed: u32) -> Self {
        Self::with_mode(DemoMode::Idle, rng_seed, String::new())
    }

    /// Start capturing a new session
    pub fn recording(rng_seed: u32, product_version: impl Into<String>) -> Self {
        let product_version = product_version.into();
        tracing::info!(
            "Recording demo (seed {:#010x}, product '{}')",
            rng_seed,
            product_version
        );
        Self::with_mode(DemoMode::Recording, rng_seed, product_version)
    }

    /// Replay a loaded demo file
    pub fn replaying(file: DemoFile) -> Self {
        tracing::info!(
            "Replaying demo: {} ticks, {} markers, {} stream bytes",
            file.total_ticks,
            file.markers.len(),
            file.stream.len()
        );
        let mut channel = Self::with_mode(DemoMode::Replaying, file.rng_seed, file.product_version);
        channel.buffer = BitBuffer::from_bytes(file.stream);
        channel.markers = file.markers;
        channel.total_ticks = file.total_ticks;
        channel
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    pub fn mode(&self) -> DemoMode {
        self.mode
    }

    pub fn is_recording(&self) -> bool {
        self.mode == DemoMode::Recording
    }

    pub fn is_replaying(&self) -> bool {
        self.mode == DemoMode::Replaying
    }

    pub fn update_count(&self) -> u32 {
        self.update_count
    }

    pub fn rng_seed(&self) -> u32 {
        self.rng_seed
    }

    pub fn product_version(&self) -> &str {
        &self.product_version
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Length of the replayed recording in ticks (0 when not replaying)
    pub fn total_ticks(&self) -> u32 {
        self.total_ticks
    }

    pub fn policy(&self) -> DesyncPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: DesyncPolicy) {
        self.policy = policy;
    }

    /// Current pointer position as tracked by the channel
    pub fn pointer(&self) -> (i32, i32) {
        self.pointer
    }

    /// Whether the replayed stream has reached its loading-complete point
    pub fn replay_loading_complete(&self) -> bool {
        self.loading_complete
    }

    /// Video mode carried by the stream, taken once
    pub fn take_video_mode(&mut self) -> Option<VideoMode> {
        self.video_mode.take()
    }

    /// Stop reading the stream; later side effects return benign defaults
    pub fn begin_shutdown(&mut self) {
        if self.is_replaying() && !self.shutting_down {
            tracing::info!("Replay interrupted at tick {}", self.update_count);
            self.shutting_down = true;
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// Advance the tick counter. Only the scheduler calls this.
    pub(crate) fn advance_tick(&mut self) {
        self.update_count += 1;
        if let Some(FastForward::ToTick(target)) = self.fast_forward
            && self.update_count >= target
        {
            self.fast_forward = None;
        }
    }

    // ------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------

    fn assert_owner(&self) {
        assert_eq!(
            thread::current().id(),
            self.owner,
            "demo stream written from a thread other than the one that created it"
        );
    }

    /// Encode the ticks elapsed since the previous command
    ///
    /// Runs longer than one nibble are split into 15-tick Idle commands.
    pub fn write_timing_block(&mut self) {
        self.assert_owner();
        while self.update_count - self.last_encoded > MAX_TIMING_DELTA {
            self.buffer.write_bits(MAX_TIMING_DELTA, TIMING_BITS);
            self.last_encoded += MAX_TIMING_DELTA;
            Command::Idle.encode(&mut self.buffer);
        }
        self.buffer
            .write_bits(self.update_count - self.last_encoded, TIMING_BITS);
        self.last_encoded = self.update_count;
    }

    /// Append a command at the current tick (no-op unless recording)
    pub fn record(&mut self, command: &Command) {
        if !self.is_recording() {
            return;
        }
        self.write_timing_block();
        command.encode(&mut self.buffer);
        tracing::trace!("Recorded {} at tick {}", command, self.update_count);
    }

    /// Synthetic pointer move needed before a button edge at a new position
    ///
    /// Buttons are recorded without coordinates, so a press away from the
    /// tracked pointer must be preceded by a move in both live and replayed runs.
    pub fn pointer_catch_up(&self, event: &InputEvent) -> Option<InputEvent> {
        match *event {
            InputEvent::MouseDown { x, y, .. } | InputEvent::MouseUp { x, y, .. }
                if (x, y) != self.pointer =>
            {
                Some(InputEvent::MouseMove { x, y })
            }
            _ => None,
        }
    }

    /// The event as a replay of the recording will reconstruct it
    ///
    /// While recording, pointer coordinates are clamped to the absolute
    /// position range and button codes to [`MOUSE_BUTTON_RANGE`]. The live run
    /// must dispatch this value, not the raw event, or it sees input the
    /// replay never will. Other modes pass events through untouched.
    pub fn normalize_input(&self, event: InputEvent) -> InputEvent {
        if !self.is_recording() {
            return event;
        }
        let coord = |v: i32| v.clamp(0, i32::from(MAX_MOUSE_COORD));
        let button = |b: i8| b.clamp(*MOUSE_BUTTON_RANGE.start(), *MOUSE_BUTTON_RANGE.end());
        match event {
            InputEvent::MouseMove { x, y } => InputEvent::MouseMove {
                x: coord(x),
                y: coord(y),
            },
            InputEvent::MouseDown { x, y, button: b } => InputEvent::MouseDown {
                x: coord(x),
                y: coord(y),
                button: button(b),
            },
            InputEvent::MouseUp { x, y, button: b } => InputEvent::MouseUp {
                x: coord(x),
                y: coord(y),
                button: button(b),
            },
            other => other,
        }
    }

    /// Track and (when recording) encode a live input event
    ///
    /// The event is normalized first; see [`normalize_input`](Self::normalize_input).
    pub fn record_input(&mut self, event: &InputEvent) {
        let command = match self.normalize_input(*event) {
            InputEvent::MouseMove { x, y } => {
                let dx = x.saturating_sub(self.pointer.0);
                let dy = y.saturating_sub(self.pointer.1);
                self.pointer = (x, y);
                if MOUSE_DELTA_RANGE.contains(&dx) && MOUSE_DELTA_RANGE.contains(&dy) {
                    Command::MouseDelta {
                        dx: dx as i8,
                        dy: dy as i8,
                    }
                } else {
                    Command::MousePosition {
                        x: x.clamp(0, i32::from(MAX_MOUSE_COORD)) as u16,
                        y: y.clamp(0, i32::from(MAX_MOUSE_COORD)) as u16,
                    }
                }
            }
            InputEvent::MouseDown { button, .. } => Command::MouseButton { down: true, button },
            InputEvent::MouseUp { button, .. } => Command::MouseButton {
                down: false,
                button,
            },
            InputEvent::MouseWheel(delta) => Command::MouseWheel(delta),
            InputEvent::KeyDown(code) => Command::KeyDown(code),
            InputEvent::KeyUp(code) => Command::KeyUp(code),
            InputEvent::KeyChar(ch) => Command::KeyChar(ch),
            InputEvent::Activate(active) => Command::Activate(active),
            InputEvent::Minimize(minimized) => Command::Minimize(minimized),
            InputEvent::MouseEnter => Command::MouseEnter,
            InputEvent::MouseExit => Command::MouseExit,
            InputEvent::Close => Command::Close,
        };
        self.record(&command);
    }

    /// Record a scrub marker at the current tick; during replay, reaching a
    /// marker ends a fast-forward to the next marker
    pub fn add_marker(&mut self, label: impl Into<String>) {
        match self.mode {
            DemoMode::Recording => {
                let label = label.into();
                tracing::debug!("Marker '{}' at tick {}", label, self.update_count);
                self.markers.push(Marker {
                    label,
                    tick: self.update_count,
                });
            }
            DemoMode::Replaying => {
                if self.fast_forward == Some(FastForward::NextMarker) {
                    self.fast_forward = None;
                }
            }
            DemoMode::Idle => {}
        }
    }

    /// Snapshot the recording so far as a demo file
    pub fn to_demo_file(&self) -> DemoFile {
        DemoFile {
            version: DEMO_VERSION,
            rng_seed: self.rng_seed,
            product_version: self.product_version.clone(),
            markers: self.markers.clone(),
            total_ticks: self.update_count,
            stream: self.buffer.data().to_vec(),
        }
    }

    /// Encoded stream length in bytes
    pub fn stream_len(&self) -> usize {
        self.buffer.len()
    }

    // ------------------------------------------------------------------
    // Replaying
    // ------------------------------------------------------------------

    /// Fewer bits than the smallest command means only padding is left
    fn stream_exhausted(&self) -> bool {
        self.buffer.bits_remaining() < MIN_COMMAND_BITS
    }

    /// Decode the next command if none is pending and report whether the
    /// pending command is due at the current tick
    ///
    /// A `required` call that finds no due command is a sequence error.
    pub fn prepare_command(&mut self, required: bool) -> DemoResult<bool> {
        if !self.is_replaying() {
            return Ok(false);
        }

        if self.pending.is_none() {
            if self.stream_exhausted() {
                if required {
                    return Err(self.sequence_error("demo stream exhausted".into()));
                }
                return Ok(false);
            }
            let delta = self.buffer.read_bits(TIMING_BITS)?;
            self.last_encoded += delta;
            let command = Command::decode(&mut self.buffer)?;
            tracing::trace!("Decoded {} for tick {}", command, self.last_encoded);
            self.pending = Some(command);
        }

        let due = self.last_encoded == self.update_count;
        if required && !due {
            return Err(self.sequence_error(format!(
                "next command is encoded for tick {}",
                self.last_encoded
            )));
        }
        Ok(due)
    }

    fn sequence_error(&self, detail: String) -> DemoError {
        DemoError::Sequence {
            tick: self.update_count,
            detail,
        }
    }

    /// Apply the divergence policy to an error
    fn diverge(&self, err: DemoError) -> DemoResult<()> {
        match self.policy {
            DesyncPolicy::Fatal => Err(err),
            DesyncPolicy::Tolerate => {
                tracing::warn!("Ignoring replay divergence: {}", err);
                Ok(())
            }
        }
    }

    /// Take the due command, which must carry `opcode`
    ///
    /// Returns `None` when a divergence was tolerated; the stream is left
    /// untouched so a later consumer can still pick up its command.
    pub fn take_required(&mut self, opcode: LongOpcode) -> DemoResult<Option<Command>> {
        match self.prepare_command(true) {
            Ok(_) => {}
            Err(e) if e.is_divergence() => {
                self.diverge(e)?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        let found = self.pending.as_ref().map(Command::opcode);
        if found != Some(Opcode::Long(opcode)) {
            let found = found.map_or_else(|| "nothing".to_string(), |op| op.to_string());
            self.diverge(self.sequence_error(format!("expected {opcode:?}, found {found}")))?;
            return Ok(None);
        }
        Ok(self.pending.take())
    }

    /// Dispatch the next due input command, if any
    ///
    /// Idle, loading-complete and video-mode commands are absorbed here.
    /// A due side-effect command is left pending for its consumer.
    pub fn next_due_event(&mut self) -> DemoResult<Option<InputEvent>> {
        while self.is_replaying() && !self.shutting_down {
            if !self.prepare_command(false)? {
                return Ok(None);
            }
            let Some(command) = self.pending.as_ref() else {
                return Ok(None);
            };
            if !command.is_input() && *command != Command::Idle {
                return Ok(None);
            }
            let Some(command) = self.pending.take() else {
                return Ok(None);
            };

            let (x, y) = self.pointer;
            let event = match command {
                Command::MouseDelta { dx, dy } => {
                    self.pointer = (x + i32::from(dx), y + i32::from(dy));
                    InputEvent::MouseMove {
                        x: self.pointer.0,
                        y: self.pointer.1,
                    }
                }
                Command::MousePosition { x, y } => {
                    self.pointer = (i32::from(x), i32::from(y));
                    InputEvent::MouseMove {
                        x: self.pointer.0,
                        y: self.pointer.1,
                    }
                }
                Command::MouseButton { down: true, button } => InputEvent::MouseDown { x, y, button },
                Command::MouseButton {
                    down: false,
                    button,
                } => InputEvent::MouseUp { x, y, button },
                Command::MouseWheel(delta) => InputEvent::MouseWheel(delta),
                Command::KeyDown(code) => InputEvent::KeyDown(code),
                Command::KeyUp(code) => InputEvent::KeyUp(code),
                Command::KeyChar(ch) => InputEvent::KeyChar(ch),
                Command::Activate(active) => InputEvent::Activate(active),
                Command::Minimize(minimized) => InputEvent::Minimize(minimized),
                Command::MouseEnter => InputEvent::MouseEnter,
                Command::MouseExit => InputEvent::MouseExit,
                Command::Close => InputEvent::Close,
                Command::LoadingComplete => {
                    self.loading_complete = true;
                    continue;
                }
                Command::VideoMode {
                    windowed,
                    refresh_rate,
                } => {
                    self.video_mode = Some(VideoMode {
                        windowed,
                        refresh_rate,
                    });
                    continue;
                }
                _ => continue,
            };
            return Ok(Some(event));
        }
        Ok(None)
    }

    /// Whether the scheduler may advance the tick counter during replay
    ///
    /// A tick is allowed while the next command lies in the future, or after
    /// the stream ends until the recorded length is reached. A due command
    /// that nobody consumed, or one encoded for a tick already passed, is a
    /// sequence error.
    pub fn replay_can_tick(&mut self) -> DemoResult<bool> {
        if !self.is_replaying() || self.shutting_down {
            return Ok(false);
        }
        if self.pending.is_none() && !self.stream_exhausted() {
            self.prepare_command(false)?;
        }

        match &self.pending {
            Some(command) if self.last_encoded < self.update_count => {
                let err = self.sequence_error(format!(
                    "{command} is encoded for tick {}, already passed",
                    self.last_encoded
                ));
                self.diverge(err)?;
                self.pending = None;
                Ok(false)
            }
            Some(command) if self.last_encoded == self.update_count => {
                if command.is_input() || *command == Command::Idle {
                    // Still waiting to be dispatched
                    return Ok(false);
                }
                let err = self.sequence_error(format!("{command} was never consumed"));
                self.diverge(err)?;
                self.pending = None;
                Ok(false)
            }
            Some(_) => Ok(self.last_encoded > self.update_count),
            None => Ok(self.update_count < self.total_ticks),
        }
    }

    /// True once every command has been consumed and the recorded length reached
    pub fn replay_finished(&self) -> bool {
        self.is_replaying()
            && self.pending.is_none()
            && self.stream_exhausted()
            && self.update_count >= self.total_ticks
    }

    // ------------------------------------------------------------------
    // Fast-forward and markers
    // ------------------------------------------------------------------

    /// Request a fast-forward (ignored unless replaying)
    pub fn fast_forward(&mut self, target: FastForward) {
        if !self.is_replaying() {
            return;
        }
        if let FastForward::ToTick(tick) = target
            && tick <= self.update_count
        {
            return;
        }
        tracing::debug!("Fast-forward to {:?}", target);
        self.fast_forward = Some(target);
    }

    /// Fast-forward to a recorded marker; false if no such marker lies ahead
    pub fn fast_forward_to_marker(&mut self, label: &str) -> bool {
        let tick = self
            .markers
            .iter()
            .find(|m| m.label == label && m.tick > self.update_count)
            .map(|m| m.tick);
        match tick {
            Some(tick) => {
                self.fast_forward(FastForward::ToTick(tick));
                true
            }
            None => false,
        }
    }

    pub fn fast_forward_active(&self) -> bool {
        self.is_replaying() && !self.shutting_down && self.fast_forward.is_some()
    }

    pub fn cancel_fast_forward(&mut self) {
        self.fast_forward = None;
    }

    /// Markers after the current tick
    pub fn upcoming_markers(&self) -> impl Iterator<Item = &Marker> {
        let now = self.update_count;
        self.markers.iter().filter(move |m| m.tick > now)
    }

    // ------------------------------------------------------------------
    // Assertions and synchronized values
    // ------------------------------------------------------------------

    /// Record a string, or check it against the recorded one
    pub fn assert_string_equal(&mut self, value: &str) -> DemoResult<()> {
        match self.mode {
            DemoMode::Idle => Ok(()),
            DemoMode::Recording => {
                self.record(&Command::AssertString(value.to_string()));
                Ok(())
            }
            DemoMode::Replaying => {
                if self.shutting_down {
                    return Ok(());
                }
                if let Some(Command::AssertString(recorded)) =
                    self.take_required(LongOpcode::AssertString)?
                    && recorded != value
                {
                    let err = DemoError::Desync {
                        tick: self.update_count,
                        detail: format!("expected {recorded:?}, got {value:?}"),
                    };
                    self.diverge(err)?;
                }
                Ok(())
            }
        }
    }

    /// Record an integer, or check it against the recorded one
    pub fn assert_int_equal(&mut self, value: u32) -> DemoResult<()> {
        match self.mode {
            DemoMode::Idle => Ok(()),
            DemoMode::Recording => {
                self.record(&Command::AssertInt(value));
                Ok(())
            }
            DemoMode::Replaying => {
                if self.shutting_down {
                    return Ok(());
                }
                if let Some(Command::AssertInt(recorded)) =
                    self.take_required(LongOpcode::AssertInt)?
                    && recorded != value
                {
                    let err = DemoError::Desync {
                        tick: self.update_count,
                        detail: format!("expected {recorded}, got {value}"),
                    };
                    self.diverge(err)?;
                }
                Ok(())
            }
        }
    }

    /// Record live bytes, or hand back the recorded ones during replay
    pub fn sync_buffer(&mut self, live: Vec<u8>) -> DemoResult<Vec<u8>> {
        match self.mode {
            DemoMode::Idle => Ok(live),
            DemoMode::Recording => {
                self.record(&Command::SyncBuffer(live.clone()));
                Ok(live)
            }
            DemoMode::Replaying => {
                if self.shutting_down {
                    return Ok(live);
                }
                match self.take_required(LongOpcode::SyncBuffer)? {
                    Some(Command::SyncBuffer(recorded)) => Ok(recorded),
                    _ => Ok(live),
                }
            }
        }
    }

    pub fn sync_int(&mut self, live: u32) -> DemoResult<u32> {
        let bytes = self.sync_buffer(live.to_le_bytes().to_vec())?;
        Ok(match <[u8; 4]>::try_from(bytes.as_slice()) {
            Ok(bytes) => u32::from_le_bytes(bytes),
            Err(_) => live,
        })
    }

    pub fn sync_bool(&mut self, live: bool) -> DemoResult<bool> {
        Ok(self.sync_int(u32::from(live))? != 0)
    }

    pub fn sync_string(&mut self, live: &str) -> DemoResult<String> {
        let bytes = self.sync_buffer(live.as_bytes().to_vec())?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
