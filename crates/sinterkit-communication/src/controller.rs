//! Motion controller: one serial channel, one command queue.
//!
//! Commands are enqueued FIFO and drained by a single background worker
//! per channel, so wire traffic for a channel is strictly serialized.
//! Motion commands get a `WST` barrier plus `STA?` polling before their
//! waiter resolves; `stop_all` bypasses the queue entirely, fails every
//! pending waiter, and leaves the channel cancelled until re-armed.

use crate::motor::{Motor, MoveProgram};
use crate::protocol::{decode_fault, Command, HardwareFault, Opcode, Response};
use crate::state::{MotorControllerState, MotorEvent};
use crate::transport::Transport;
use parking_lot::{Mutex, RwLock};
use sinterkit_core::config::MotionSettings;
use sinterkit_core::error::{ControlError, Error, ProtocolError, Result, TransportError, ValidationError};
use sinterkit_core::types::AxisId;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

/// Resolves with the command's outcome once the drain worker gets to it.
pub type CommandHandle = oneshot::Receiver<Result<Response>>;

/// One unit of queued wire work: a single command, or a stored-program
/// recording whose transcript must reach the wire untouched.
enum WorkItem {
    Single(Command),
    Recording { axis: AxisId, lines: Vec<String> },
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkItem::Single(command) => write!(f, "{}", command),
            WorkItem::Recording { axis, lines } => {
                write!(f, "program recording on axis {} ({} lines)", axis, lines.len())
            }
        }
    }
}

struct QueuedWork {
    work: WorkItem,
    done: oneshot::Sender<Result<Response>>,
}

#[derive(Default)]
struct CommandQueue {
    items: VecDeque<QueuedWork>,
    draining: bool,
}

/// State shared with the drain worker.
struct ChannelInner {
    name: String,
    transport: Arc<dyn Transport>,
    queue: Mutex<CommandQueue>,
    cancelled: AtomicBool,
    state: Mutex<MotorControllerState>,
    motion: MotionSettings,
}

/// A controller channel and the motors attached to it.
pub struct MotorController {
    inner: Arc<ChannelInner>,
    motors: RwLock<Vec<Motor>>,
}

impl MotorController {
    pub fn new(
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        motors: Vec<Motor>,
        motion: MotionSettings,
    ) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                name: name.into(),
                transport,
                queue: Mutex::new(CommandQueue::default()),
                cancelled: AtomicBool::new(false),
                state: Mutex::new(MotorControllerState::Idle),
                motion,
            }),
            motors: RwLock::new(motors),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> MotorControllerState {
        *self.inner.state.lock()
    }

    /// Snapshot of the attached motors.
    pub fn motors(&self) -> Vec<Motor> {
        self.motors.read().clone()
    }

    /// Commands waiting in the queue (not counting the one in flight).
    pub fn queued(&self) -> usize {
        self.inner.queue.lock().items.len()
    }

    fn motor(&self, axis: AxisId) -> Result<Motor> {
        self.motors
            .read()
            .iter()
            .find(|m| m.axis == axis)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownAxis { axis }.into())
    }

    fn set_cached_position(&self, axis: AxisId, position: f64) {
        for motor in self.motors.write().iter_mut() {
            if motor.axis == axis {
                motor.set_position(position);
            }
        }
    }

    /// Last position confirmed or commanded for the axis, without
    /// touching the wire.
    pub fn cached_position(&self, axis: AxisId) -> Result<f64> {
        Ok(self.motor(axis)?.position())
    }

    /// Push a command onto the channel queue. Spawns the drain worker
    /// if none is running.
    pub fn enqueue(&self, command: Command) -> CommandHandle {
        self.enqueue_work(WorkItem::Single(command))
    }

    fn enqueue_work(&self, work: WorkItem) -> CommandHandle {
        let (done, handle) = oneshot::channel();
        let mut queue = self.inner.queue.lock();
        trace!(channel = %self.inner.name, work = %work, "enqueued");
        queue.items.push_back(QueuedWork { work, done });
        if !queue.draining {
            queue.draining = true;
            tokio::spawn(drain(Arc::clone(&self.inner)));
        }
        handle
    }

    /// Enqueue and wait for the outcome.
    pub async fn submit(&self, command: Command) -> Result<Response> {
        match self.enqueue(command).await {
            Ok(result) => result,
            // the drain worker dropped the sender; treat as cancelled
            Err(_) => Err(ControlError::Cancelled.into()),
        }
    }

    /// Move one axis to an absolute position and wait for the stop.
    pub async fn move_absolute(&self, axis: AxisId, target: f64) -> Result<()> {
        let motor = self.motor(axis)?;
        let command = motor.move_absolute(target)?;
        self.run_motion(command, target).await
    }

    /// Move one axis by a relative distance and wait for the stop.
    pub async fn move_relative(&self, axis: AxisId, distance: f64) -> Result<()> {
        let motor = self.motor(axis)?;
        let command = motor.move_relative(distance)?;
        self.run_motion(command, motor.relative_target(distance)).await
    }

    /// Home one axis (absolute move to its home position).
    pub async fn home(&self, axis: AxisId) -> Result<()> {
        let motor = self.motor(axis)?;
        let target = motor.home_position;
        self.run_motion(motor.home(), target).await
    }

    /// Home every attached motor, in attachment order.
    pub async fn home_all(&self) -> Result<()> {
        let axes: Vec<AxisId> = self.motors.read().iter().map(|m| m.axis).collect();
        for axis in axes {
            self.home(axis).await?;
        }
        Ok(())
    }

    /// Move every attached motor to the same absolute position. Axes
    /// that fail do not stop the remaining axes from being attempted;
    /// all failures are aggregated.
    pub async fn move_all_absolute(&self, target: f64) -> Result<()> {
        let axes: Vec<AxisId> = self.motors.read().iter().map(|m| m.axis).collect();
        let attempted = axes.len();
        let mut failures = Vec::new();
        for axis in axes {
            if let Err(e) = self.move_absolute(axis, target).await {
                warn!(channel = %self.inner.name, axis, error = %e, "axis move failed");
                failures.push((axis, e));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::MultiAxis { attempted, failures })
        }
    }

    /// Move every attached motor by the same relative distance, with
    /// the same aggregation semantics as [`move_all_absolute`].
    ///
    /// [`move_all_absolute`]: MotorController::move_all_absolute
    pub async fn move_all_relative(&self, distance: f64) -> Result<()> {
        let axes: Vec<AxisId> = self.motors.read().iter().map(|m| m.axis).collect();
        let attempted = axes.len();
        let mut failures = Vec::new();
        for axis in axes {
            if let Err(e) = self.move_relative(axis, distance).await {
                warn!(channel = %self.inner.name, axis, error = %e, "axis move failed");
                failures.push((axis, e));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::MultiAxis { attempted, failures })
        }
    }

    /// Explicit wait-for-stop on one axis.
    pub async fn wait_for_stop(&self, axis: AxisId) -> Result<()> {
        self.motor(axis)?;
        self.submit(Command::wait_for_stop(axis)).await?;
        Ok(())
    }

    /// Record a stored move program into its firmware slot. The whole
    /// transcript goes through the queue as one unit and its lines
    /// reach the wire verbatim; stop polling is suppressed so nothing
    /// but the program body lands between `PGM` and `END`.
    pub async fn record_program(&self, program: &MoveProgram) -> Result<()> {
        self.motor(program.axis())?;
        if program.is_empty() {
            return Err(ValidationError::InvalidConfig {
                reason: format!("program slot {} has no moves to record", program.slot()),
            }
            .into());
        }
        let work = WorkItem::Recording {
            axis: program.axis(),
            lines: program.record_lines(),
        };
        match self.enqueue_work(work).await {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(ControlError::Cancelled.into()),
        }
    }

    /// Replay a recorded program and wait for the stage to stop.
    pub async fn execute_program(&self, program: &MoveProgram) -> Result<()> {
        self.motor(program.axis())?;
        self.submit(program.execute_command()).await?;
        Ok(())
    }

    /// Erase a recorded program's firmware slot.
    pub async fn erase_program(&self, program: &MoveProgram) -> Result<()> {
        self.motor(program.axis())?;
        self.submit(program.erase_command()).await?;
        Ok(())
    }

    /// Read the current position, refreshing the cache.
    pub async fn position(&self, axis: AxisId) -> Result<f64> {
        self.motor(axis)?;
        match self.submit(Command::query_position(axis)).await? {
            Response::Position(value) => {
                self.set_cached_position(axis, value);
                Ok(value)
            }
            other => Err(unexpected("position", &other)),
        }
    }

    /// Read the status byte.
    pub async fn status(&self, axis: AxisId) -> Result<crate::protocol::StatusByte> {
        self.motor(axis)?;
        match self.submit(Command::query_status(axis)).await? {
            Response::Status(status) => Ok(status),
            other => Err(unexpected("status", &other)),
        }
    }

    /// Read and clear the latched fault list for one axis. An axis with
    /// nothing latched yields an empty list.
    pub async fn read_and_clear_faults(&self, axis: AxisId) -> Result<Vec<HardwareFault>> {
        self.motor(axis)?;
        match self.submit(Command::query_errors(axis)).await? {
            Response::Faults(faults) => Ok(faults),
            other => Err(unexpected("faults", &other)),
        }
    }

    /// Stop one axis through the queue.
    pub async fn stop(&self, axis: AxisId) -> Result<()> {
        self.motor(axis)?;
        self.submit(Command::stop(axis)).await?;
        Ok(())
    }

    /// Emergency stop: fail every queued command, write `0STP` straight
    /// to the wire, and leave the channel cancelled until [`rearm`].
    ///
    /// [`rearm`]: MotorController::rearm
    pub async fn stop_all(&self) -> Result<()> {
        info!(channel = %self.inner.name, "stop all");
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let pending: Vec<QueuedWork> = {
            let mut queue = self.inner.queue.lock();
            queue.items.drain(..).collect()
        };
        for queued in pending {
            let _ = queued.done.send(Err(ControlError::Cancelled.into()));
        }
        let transport = Arc::clone(&self.inner.transport);
        tokio::task::spawn_blocking(move || transport.write_line(&Command::stop_all().encode()))
            .await
            .map_err(join_failure)??;
        let mut state = self.inner.state.lock();
        *state = state.transition(MotorEvent::Cancel)?;
        Ok(())
    }

    /// Clear the cancellation latch so the channel accepts work again.
    pub fn rearm(&self) {
        self.inner.cancelled.store(false, Ordering::SeqCst);
        let mut state = self.inner.state.lock();
        if *state == MotorControllerState::Cancelled {
            *state = MotorControllerState::Idle;
            debug!(channel = %self.inner.name, "re-armed");
        }
    }

    async fn run_motion(&self, command: Command, target: f64) -> Result<()> {
        let axis = command.axis;
        match self.submit(command).await {
            Ok(_) => {
                self.set_cached_position(axis, target);
                Ok(())
            }
            Err(e) if e.is_hardware_fault() => {
                warn!(channel = %self.inner.name, axis, error = %e, "fault during move, stopping all axes");
                if let Err(stop_err) = self.stop_all().await {
                    warn!(channel = %self.inner.name, error = %stop_err, "stop all after fault failed");
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

fn unexpected(expected: &str, got: &Response) -> Error {
    ProtocolError::UnexpectedReply {
        expected: expected.to_string(),
        got: got.kind().to_string(),
    }
    .into()
}

fn join_failure(e: tokio::task::JoinError) -> Error {
    Error::Other(format!("transport task failed: {}", e))
}

/// Drain worker: pops commands FIFO until the queue empties or the
/// channel is cancelled. Exactly one runs per channel at a time; the
/// `draining` flag is cleared under the queue lock so an enqueue racing
/// with worker exit always sees a consistent picture.
async fn drain(chan: Arc<ChannelInner>) {
    trace!(channel = %chan.name, "drain worker started");
    loop {
        let next = {
            let mut queue = chan.queue.lock();
            if chan.cancelled.load(Ordering::SeqCst) {
                for queued in queue.items.drain(..) {
                    let _ = queued.done.send(Err(ControlError::Cancelled.into()));
                }
                queue.draining = false;
                debug!(channel = %chan.name, "drain worker stopped: cancelled");
                return;
            }
            match queue.items.pop_front() {
                Some(queued) => queued,
                None => {
                    queue.draining = false;
                    trace!(channel = %chan.name, "drain worker stopped: queue empty");
                    return;
                }
            }
        };
        let result = process(&chan, &next.work).await;
        if let Err(e) = &result {
            warn!(channel = %chan.name, work = %next.work, error = %e, "command failed");
        }
        let _ = next.done.send(result);
    }
}

/// Advance the channel state machine, ignoring events made stale by a
/// concurrent cancellation. The poll loop surfaces the cancellation
/// itself.
fn apply(chan: &ChannelInner, event: MotorEvent) {
    let mut state = chan.state.lock();
    match state.transition(event) {
        Ok(next) => *state = next,
        Err(e) => debug!(channel = %chan.name, error = %e, "state event ignored"),
    }
}

async fn process(chan: &ChannelInner, work: &WorkItem) -> Result<Response> {
    let command = match work {
        WorkItem::Recording { lines, .. } => {
            for line in lines {
                write_line(chan, line.clone()).await?;
            }
            return Ok(Response::Ack);
        }
        WorkItem::Single(command) => command,
    };
    let line = command.encode();
    write_line(chan, line.clone()).await?;

    if command.opcode.is_motion() {
        apply(chan, MotorEvent::Move);
        write_line(chan, Command::wait_for_stop(command.axis).encode()).await?;
        apply(chan, MotorEvent::Wait);
        poll_until_stopped(chan, command.axis).await?;
        apply(chan, MotorEvent::Done);
        // Done folds straight back to Idle for the next command
        apply(chan, MotorEvent::Done);
        return Ok(Response::Ack);
    }

    if command.opcode == Opcode::WaitForStop {
        // line already on the wire; just confirm the stop
        poll_until_stopped(chan, command.axis).await?;
        return Ok(Response::Ack);
    }

    if command.opcode.expects_reply() {
        return read_reply(chan, &line, command).await;
    }

    Ok(Response::Ack)
}

async fn write_line(chan: &ChannelInner, line: String) -> Result<()> {
    let transport = Arc::clone(&chan.transport);
    tokio::task::spawn_blocking(move || transport.write_line(&line))
        .await
        .map_err(join_failure)?
}

async fn read_raw_line(chan: &ChannelInner) -> Result<String> {
    let transport = Arc::clone(&chan.transport);
    let timeout = Duration::from_millis(chan.motion.reply_timeout_ms);
    tokio::task::spawn_blocking(move || transport.read_line(timeout))
        .await
        .map_err(join_failure)?
}

async fn try_read_reply(chan: &ChannelInner) -> Result<Response> {
    let line = read_raw_line(chan).await?;
    Response::parse(&line)
}

/// Read one reply, retrying once after a garbled line. A second garbled
/// line is escalated to a transport failure.
async fn read_reply(chan: &ChannelInner, line: &str, command: &Command) -> Result<Response> {
    match try_read_reply(chan).await {
        Ok(reply) => Ok(reply),
        // a fault-free axis answers ERR? with silence
        Err(e) if e.is_timeout() && command.opcode == Opcode::QueryErrors => {
            Ok(Response::Faults(Vec::new()))
        }
        Err(Error::Protocol(first)) => {
            warn!(channel = %chan.name, error = %first, "garbled reply, retrying once");
            write_line(chan, line.to_string()).await?;
            match try_read_reply(chan).await {
                Ok(reply) => Ok(reply),
                Err(Error::Protocol(second)) => Err(TransportError::ReadFailed {
                    reason: format!("reply stayed garbled after retry: {}", second),
                }
                .into()),
                Err(e) => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}

/// Poll `STA?` until the stage reports stopped, a latched fault shows
/// up, the channel is cancelled, or the attempt budget runs out.
async fn poll_until_stopped(chan: &ChannelInner, axis: AxisId) -> Result<()> {
    let interval = Duration::from_millis(chan.motion.poll_interval_ms);
    for attempt in 0..chan.motion.max_poll_attempts {
        if chan.cancelled.load(Ordering::SeqCst) {
            return Err(ControlError::Cancelled.into());
        }
        write_line(chan, Command::query_status(axis).encode()).await?;
        match try_read_reply(chan).await {
            Ok(Response::Status(status)) => {
                if status.has_faults() {
                    let fault = read_first_fault(chan, axis).await?;
                    return Err(ControlError::Hardware {
                        axis,
                        code: fault.code,
                        message: fault.message,
                    }
                    .into());
                }
                if status.stage_stopped() {
                    trace!(channel = %chan.name, axis, attempt, "stop confirmed");
                    return Ok(());
                }
            }
            Ok(other) => {
                debug!(channel = %chan.name, axis, reply = other.kind(), "unexpected reply while polling");
            }
            // a missed or garbled poll just burns an attempt
            Err(e) if e.is_timeout() => {}
            Err(Error::Protocol(_)) => {}
            Err(e) => return Err(e),
        }
        tokio::time::sleep(interval).await;
    }
    Err(ControlError::StopTimeout {
        axis,
        attempts: chan.motion.max_poll_attempts,
    }
    .into())
}

async fn read_first_fault(chan: &ChannelInner, axis: AxisId) -> Result<HardwareFault> {
    write_line(chan, Command::query_errors(axis).encode()).await?;
    match try_read_reply(chan).await {
        Ok(Response::Faults(faults)) => Ok(faults.into_iter().next().unwrap_or(HardwareFault {
            code: 0,
            command: String::new(),
            message: decode_fault(0),
        })),
        Ok(other) => Err(unexpected("faults", &other)),
        // the fault bit was set but the list read timed out; report the
        // channel itself as the fault
        Err(e) if e.is_timeout() => Ok(HardwareFault {
            code: 0,
            command: String::new(),
            message: decode_fault(0),
        }),
        Err(e) => Err(e),
    }
}
