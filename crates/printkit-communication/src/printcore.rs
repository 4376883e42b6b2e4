//! Printer communication core
//!
//! Owns the full command stream to a reprap-class firmware: the main print
//! queue, the priority queue, line numbering and checksumming, `ok`-gated
//! flow control, resend recovery, and the listener/sender thread pair.
//!
//! One listener thread drains the device and classifies replies; one sender
//! thread transmits, gated on the `clear` flag the listener toggles. All
//! protocol state lives behind a single mutex with a condition variable
//! signalled on every transition the sender might be waiting for. At most
//! one unacknowledged numbered command is ever in flight.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use printkit_core::{
    strip_comments, DeviceError, EventDispatcher, GCode, GLine, HandlerHandle,
    PrinterEventHandler, Result,
};

use crate::device::{self, Endpoint, Link, ReadResult};
use crate::protocol::{self, Reply};

/// Lines retained in the in-memory receive log.
const LOG_CAPACITY: usize = 10_000;

/// Delay before the engine pokes the firmware with `M105` to discover it.
const BOOTSTRAP_DELAY: Duration = Duration::from_secs(1);

/// Interval between repeated bootstrap probes while still offline.
const BOOTSTRAP_RETRY: Duration = Duration::from_secs(4);

/// Bound on the wait for an in-flight acknowledgment during pause/cancel.
const ACK_WAIT: Duration = Duration::from_secs(1);

/// Polling granularity of condvar waits, so stop flags are always noticed.
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Consecutive write failures after which the bootstrap gives up.
const MAX_WRITE_FAILURES: u32 = 4;

/// Protocol and queue state shared between the caller, listener, and sender.
struct Proto {
    /// Clear to send; true initially and after each `ok`/greeting.
    clear: bool,
    /// The firmware has responded and is active.
    online: bool,
    /// `on_online` has been fired for this connection.
    online_reported: bool,
    /// A print is actively feeding the main queue.
    printing: bool,
    /// A print is suspended, cursor and line number retained.
    paused: bool,
    /// Next line number to assign to a numbered send.
    lineno: u32,
    /// When set, the sender replays `sentcache` from here before new work.
    resendfrom: Option<u32>,
    /// Cursor into `mainqueue`.
    queueindex: usize,
    mainqueue: GCode,
    priqueue: VecDeque<String>,
    /// Line number -> exact framed line, for honoring resend requests.
    sentcache: HashMap<u32, String>,
    /// Shutdown signal for both threads.
    stop: bool,
    writefailures: u32,
    /// `on_disconnect` has been fired for this connection.
    disconnect_reported: bool,
}

impl Proto {
    fn new() -> Self {
        Self {
            clear: true,
            online: false,
            online_reported: false,
            printing: false,
            paused: false,
            lineno: 0,
            resendfrom: None,
            queueindex: 0,
            mainqueue: GCode::default(),
            priqueue: VecDeque::new(),
            sentcache: HashMap::new(),
            stop: false,
            writefailures: 0,
            disconnect_reported: false,
        }
    }
}

struct Shared {
    proto: Mutex<Proto>,
    cond: Condvar,
    events: EventDispatcher,
    log: Mutex<VecDeque<String>>,
}

impl Shared {
    /// Common teardown for EOF and I/O failures: halt the stream, keep the
    /// cursor for a later resume, report the disconnect once.
    fn handle_lost(&self) {
        let fire = {
            let mut st = self.proto.lock();
            st.printing = false;
            st.online = false;
            st.clear = true;
            st.stop = true;
            let fire = !st.disconnect_reported;
            st.disconnect_reported = true;
            self.cond.notify_all();
            fire
        };
        if fire {
            self.events.dispatch("disconnect", |h| h.on_disconnect());
        }
    }
}

/// What the sender decided to do with the lock held; I/O happens after.
enum SendAction {
    /// Put a line on the wire.
    Write {
        /// Framed line, newline not yet appended.
        wire: String,
        /// Parsed form handed to `on_send`.
        gline: GLine,
        /// Set for main-queue lines; fires `on_printsend`.
        printsend: Option<GLine>,
        /// Z of the layer the cursor just crossed into.
        layerchange: Option<f64>,
    },
    /// A host command was consumed instead of transmitted.
    HostCommand { line: String, layerchange: Option<f64> },
    /// A comment/blank line was skipped; nothing on the wire.
    Skipped { layerchange: Option<f64> },
    /// The main queue drained.
    End,
    /// Nothing to do.
    Idle,
}

/// Core printer host: queues, line protocol, and the thread pair driving
/// them.
///
/// Created idle; bound to an endpoint by [`connect`](Self::connect); torn
/// down by [`disconnect`](Self::disconnect) (idempotent). A print job runs
/// from [`startprint`](Self::startprint) through draining, with optional
/// [`pause`](Self::pause)/[`resume`](Self::resume), to natural end or
/// [`cancelprint`](Self::cancelprint).
pub struct PrintCore {
    shared: Arc<Shared>,
    link: Mutex<Option<Arc<dyn Link>>>,
    read_thread: Mutex<Option<JoinHandle<()>>>,
    send_thread: Mutex<Option<JoinHandle<()>>>,
}

impl PrintCore {
    pub fn new() -> Self {
        let core = Self {
            shared: Arc::new(Shared {
                proto: Mutex::new(Proto::new()),
                cond: Condvar::new(),
                events: EventDispatcher::new(),
                log: Mutex::new(VecDeque::new()),
            }),
            link: Mutex::new(None),
            read_thread: Mutex::new(None),
            send_thread: Mutex::new(None),
        };
        core.shared.events.dispatch("init", |h| h.on_init());
        core
    }

    /// Register an event handler.
    pub fn add_event_handler(&self, handler: Arc<dyn PrinterEventHandler>) -> HandlerHandle {
        self.shared.events.register(handler)
    }

    /// Remove a previously registered event handler.
    pub fn remove_event_handler(&self, handle: &HandlerHandle) -> bool {
        self.shared.events.unregister(handle)
    }

    /// Open the endpoint and spawn the listener and sender threads.
    pub fn connect(&self, endpoint: &Endpoint) -> Result<()> {
        let link = device::open(endpoint)?;
        self.connect_link(link);
        Ok(())
    }

    /// Attach an already-open channel (the test seam; `connect` ends here).
    pub fn connect_link(&self, link: Arc<dyn Link>) {
        if self.link.lock().is_some() {
            self.disconnect();
        }

        *self.shared.proto.lock() = Proto::new();
        self.shared.log.lock().clear();
        *self.link.lock() = Some(link.clone());

        self.shared.events.dispatch("connect", |h| h.on_connect());

        let shared = self.shared.clone();
        let listener_link = link.clone();
        *self.read_thread.lock() = Some(
            std::thread::Builder::new()
                .name("read thread".to_string())
                .spawn(move || listen_loop(shared, listener_link))
                .expect("spawn read thread"),
        );

        let shared = self.shared.clone();
        *self.send_thread.lock() = Some(
            std::thread::Builder::new()
                .name("send thread".to_string())
                .spawn(move || send_loop(shared, link))
                .expect("spawn send thread"),
        );
    }

    /// Close the device and stop both threads. Idempotent; a disconnect
    /// while printing halts the stream but keeps the cursor so the print
    /// can be resumed after a reconnect.
    pub fn disconnect(&self) {
        let had_link = self.link.lock().is_some();
        {
            let mut st = self.shared.proto.lock();
            st.stop = true;
            st.printing = false;
            st.online = false;
            self.shared.cond.notify_all();
        }

        for slot in [&self.read_thread, &self.send_thread] {
            let handle = slot.lock().take();
            if let Some(handle) = handle {
                if handle.thread().id() != std::thread::current().id() {
                    let _ = handle.join();
                }
            }
        }

        if let Some(link) = self.link.lock().take() {
            if let Err(e) = link.disconnect() {
                tracing::error!("error closing device: {}", e);
            }
        }

        let fire = {
            let mut st = self.shared.proto.lock();
            st.sentcache.clear();
            let fire = had_link && !st.disconnect_reported;
            st.disconnect_reported = true;
            fire
        };
        if fire {
            self.shared.events.dispatch("disconnect", |h| h.on_disconnect());
        }
    }

    /// Hardware-reset the printer (DTR pulse; no-op over TCP).
    pub fn reset(&self) -> Result<()> {
        match self.current_link() {
            Some(link) => link.reset(),
            None => Err(DeviceError::new("Attempted to write when disconnected")),
        }
    }

    /// Start a print.
    ///
    /// Replaces the main queue and returns immediately; transmission happens
    /// on the sender thread. Returns `Ok(false)` when already printing,
    /// offline, or the job is empty.
    pub fn startprint(&self, gcode: GCode, from_index: usize) -> Result<bool> {
        let Some(link) = self.current_link() else {
            return Ok(false);
        };
        {
            let mut st = self.shared.proto.lock();
            if st.printing || !st.online || !link.is_connected() || gcode.is_empty() {
                return Ok(false);
            }
            st.mainqueue = gcode;
            st.queueindex = from_index.min(st.mainqueue.len());
            st.lineno = 0;
            st.resendfrom = None;
            st.paused = false;
        }

        let reset_line = protocol::format_lineno_reset();
        let gline = GLine::parse(protocol::LINENO_RESET);
        self.shared
            .events
            .dispatch("send", |h| h.on_send(&reset_line, &gline));
        link.write(format!("{reset_line}\n").as_bytes())?;

        {
            let mut st = self.shared.proto.lock();
            // TCP's own backpressure stands in for the first ack; serial
            // waits for the M110 to be acknowledged.
            st.clear = link.has_flow_control();
            st.printing = true;
            self.shared.cond.notify_all();
        }

        let resume = from_index > 0;
        self.shared
            .events
            .dispatch("start", |h| h.on_start(resume));
        Ok(true)
    }

    /// Pause an ongoing print, retaining the cursor and line number.
    ///
    /// Waits (bounded) for any in-flight numbered command to be
    /// acknowledged. Returns false if not printing.
    pub fn pause(&self) -> bool {
        {
            let mut st = self.shared.proto.lock();
            if !st.printing {
                return false;
            }
            st.printing = false;
            st.paused = true;
            self.shared.cond.notify_all();
        }
        self.wait_for_ack();
        true
    }

    /// Resume a paused print from the preserved cursor.
    pub fn resume(&self) -> bool {
        {
            let mut st = self.shared.proto.lock();
            if !st.paused {
                return false;
            }
            st.paused = false;
            st.printing = true;
            self.shared.cond.notify_all();
        }
        self.shared.events.dispatch("start", |h| h.on_start(true));
        true
    }

    /// Cancel an ongoing or paused print. The queue is cleared and the
    /// cursor reset; the line number is kept (it resets with the `M110` of
    /// the next print).
    pub fn cancelprint(&self) {
        let was_active = {
            let mut st = self.shared.proto.lock();
            let was_active = st.printing || st.paused;
            st.printing = false;
            st.paused = false;
            self.shared.cond.notify_all();
            was_active
        };
        self.wait_for_ack();
        {
            let mut st = self.shared.proto.lock();
            st.mainqueue = GCode::default();
            st.queueindex = 0;
            st.clear = true;
            self.shared.cond.notify_all();
        }
        if was_active {
            self.shared.events.dispatch("end", |h| h.on_end());
        }
    }

    /// Submit a command on the main path.
    ///
    /// While printing it is appended to the main queue and numbered when
    /// reached; otherwise this blocks until clear-to-send and transmits it
    /// immediately as a numbered line.
    pub fn send(&self, command: &str) -> Result<()> {
        {
            let mut st = self.shared.proto.lock();
            if st.printing {
                st.mainqueue.append(command);
                self.shared.cond.notify_all();
                return Ok(());
            }
        }

        let link = self.online_link()?;
        let stripped = strip_comments(command);
        if stripped.is_empty() {
            return Ok(());
        }

        let framed = {
            let mut st = self.wait_for_clear(&link)?;
            let framed = protocol::format_numbered(st.lineno, &stripped);
            if !stripped.contains("M110") {
                let lineno = st.lineno;
                st.sentcache.insert(lineno, framed.clone());
            }
            st.lineno += 1;
            st.clear = false;
            framed
        };

        let gline = GLine::parse(command);
        self.shared
            .events
            .dispatch("send", |h| h.on_send(&framed, &gline));
        link.write(format!("{framed}\n").as_bytes())
    }

    /// Submit a priority command, jumping the print queue.
    ///
    /// While printing it is queued ahead of the main stream; otherwise this
    /// blocks until clear-to-send and transmits it verbatim (no line
    /// number, no checksum).
    pub fn send_now(&self, command: &str) -> Result<()> {
        {
            let mut st = self.shared.proto.lock();
            if st.printing {
                st.priqueue.push_back(command.to_string());
                self.shared.cond.notify_all();
                return Ok(());
            }
        }

        let link = self.online_link()?;
        drop(self.wait_for_clear(&link)?);

        let gline = GLine::parse(command);
        self.shared
            .events
            .dispatch("send", |h| h.on_send(command, &gline));
        link.write(format!("{command}\n").as_bytes())
    }

    pub fn is_connected(&self) -> bool {
        self.current_link().is_some_and(|l| l.is_connected())
    }

    pub fn is_online(&self) -> bool {
        self.shared.proto.lock().online
    }

    pub fn is_printing(&self) -> bool {
        self.shared.proto.lock().printing
    }

    pub fn is_paused(&self) -> bool {
        self.shared.proto.lock().paused
    }

    /// Cursor position within the current job.
    pub fn queue_position(&self) -> usize {
        self.shared.proto.lock().queueindex
    }

    /// Length of the current job.
    pub fn queue_length(&self) -> usize {
        self.shared.proto.lock().mainqueue.len()
    }

    /// Snapshot of the bounded receive log.
    pub fn log_lines(&self) -> Vec<String> {
        self.shared.log.lock().iter().cloned().collect()
    }

    fn current_link(&self) -> Option<Arc<dyn Link>> {
        self.link.lock().clone()
    }

    fn online_link(&self) -> Result<Arc<dyn Link>> {
        let link = self
            .current_link()
            .ok_or_else(|| DeviceError::new("Attempted to write when disconnected"))?;
        if !self.shared.proto.lock().online {
            return Err(DeviceError::new("Not connected to printer"));
        }
        Ok(link)
    }

    /// Block until clear-to-send, erroring out if the connection dies.
    fn wait_for_clear(&self, link: &Arc<dyn Link>) -> Result<parking_lot::MutexGuard<'_, Proto>> {
        let mut st = self.shared.proto.lock();
        loop {
            if st.stop || !link.is_connected() {
                return Err(DeviceError::new("Attempted to write when disconnected"));
            }
            if st.clear {
                return Ok(st);
            }
            self.shared.cond.wait_for(&mut st, WAIT_SLICE);
        }
    }

    /// Bounded wait for the in-flight numbered command's acknowledgment.
    fn wait_for_ack(&self) {
        let deadline = Instant::now() + ACK_WAIT;
        let mut st = self.shared.proto.lock();
        while !st.clear {
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!("gave up waiting for the in-flight acknowledgment");
                break;
            }
            self.shared.cond.wait_for(&mut st, (deadline - now).min(WAIT_SLICE));
        }
    }
}

impl Default for PrintCore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PrintCore {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Listener: drains the device, classifies replies, feeds flow control and
/// the event bus. Also owns the bootstrap probe that discovers the firmware.
fn listen_loop(shared: Arc<Shared>, link: Arc<dyn Link>) {
    tracing::debug!("read thread running");
    let mut next_probe = Instant::now() + BOOTSTRAP_DELAY;

    loop {
        {
            let mut st = shared.proto.lock();
            if st.stop {
                break;
            }
            // Provoke the first reply with a temperature poll down the
            // priority path; re-arm until the firmware shows up.
            if !st.online && Instant::now() >= next_probe {
                if st.writefailures >= MAX_WRITE_FAILURES {
                    tracing::error!(
                        "aborting connection attempt after {} failed writes",
                        st.writefailures
                    );
                    next_probe = Instant::now() + Duration::from_secs(3600);
                } else {
                    st.priqueue.push_back("M105".to_string());
                    shared.cond.notify_all();
                    next_probe = Instant::now() + BOOTSTRAP_RETRY;
                }
            }
        }

        match link.readline() {
            Ok(ReadResult::Empty) => continue,
            Ok(ReadResult::Eof) => {
                tracing::debug!("device EOF, exiting read thread");
                shared.handle_lost();
                break;
            }
            Ok(ReadResult::Line(bytes)) => {
                let decoded = String::from_utf8_lossy(&bytes);
                let line = decoded.trim_end_matches(['\r', '\n']);
                if line.is_empty() {
                    continue;
                }
                {
                    let mut log = shared.log.lock();
                    if log.len() >= LOG_CAPACITY {
                        log.pop_front();
                    }
                    log.push_back(line.to_string());
                }
                handle_reply(&shared, line);
                shared.events.dispatch("recv", |h| h.on_recv(line));
            }
            Err(e) => {
                let msg = format!("Can't read from printer (disconnected?) {e}");
                tracing::error!("{}", msg);
                shared.events.dispatch("error", |h| h.on_error(&msg));
                shared.handle_lost();
                break;
            }
        }
    }
    tracing::debug!("exiting read thread");
}

/// Apply one classified reply to the protocol state and fire its events.
fn handle_reply(shared: &Shared, line: &str) {
    match protocol::classify(line) {
        Reply::Greeting => {
            let first = {
                let mut st = shared.proto.lock();
                st.clear = true;
                st.online = true;
                let first = !st.online_reported;
                st.online_reported = true;
                shared.cond.notify_all();
                first
            };
            if first {
                shared.events.dispatch("online", |h| h.on_online());
            }
            // A greeting is a firmware (re)boot; print-start subscribers
            // get told even mid-print.
            shared.events.dispatch("start", |h| h.on_start(false));
        }
        Reply::Ok { has_temp } => {
            let first = {
                let mut st = shared.proto.lock();
                st.clear = true;
                st.online = true;
                let first = !st.online_reported;
                st.online_reported = true;
                shared.cond.notify_all();
                first
            };
            if first {
                shared.events.dispatch("online", |h| h.on_online());
            }
            if has_temp {
                shared.events.dispatch("temp", |h| h.on_temp(line));
            }
        }
        Reply::Temp => {
            shared.events.dispatch("temp", |h| h.on_temp(line));
        }
        Reply::Resend(index) => {
            let mut st = shared.proto.lock();
            match index {
                Some(n) if n < st.lineno => st.resendfrom = Some(n),
                Some(n) => {
                    tracing::warn!("resend index {} out of range (lineno {})", n, st.lineno)
                }
                None => tracing::warn!("malformed resend request: {:?}", line),
            }
            // Forced true either way so a bad request cannot deadlock us.
            st.clear = true;
            shared.cond.notify_all();
        }
        Reply::Error => {
            // Firmware diagnostics do not alter flow control; the firmware
            // decides whether it keeps going.
            shared.events.dispatch("error", |h| h.on_error(line));
        }
        Reply::Debug => {}
        Reply::Other => {}
    }
}

/// Sender: waits on clear-to-send and transmits by the selection order
/// resend > priority > main queue.
fn send_loop(shared: Arc<Shared>, link: Arc<dyn Link>) {
    tracing::debug!("send thread running");
    loop {
        let action = {
            let mut st = shared.proto.lock();
            loop {
                if st.stop {
                    tracing::debug!("exiting send thread");
                    return;
                }
                let has_work =
                    st.resendfrom.is_some() || !st.priqueue.is_empty() || st.printing;
                if st.clear && has_work {
                    break;
                }
                shared.cond.wait_for(&mut st, WAIT_SLICE);
            }
            next_action(&mut st, &shared.events)
        };

        match action {
            SendAction::Write {
                wire,
                gline,
                printsend,
                layerchange,
            } => {
                if let Some(z) = layerchange {
                    shared.events.dispatch("layerchange", |h| h.on_layerchange(z));
                }
                shared.events.dispatch("send", |h| h.on_send(&wire, &gline));
                match link.write(format!("{wire}\n").as_bytes()) {
                    Ok(()) => {
                        shared.proto.lock().writefailures = 0;
                        if let Some(gline) = printsend {
                            shared
                                .events
                                .dispatch("printsend", |h| h.on_printsend(&gline));
                        }
                    }
                    Err(e) => {
                        let msg = format!("Can't write to printer (disconnected?) {e}");
                        tracing::error!("{}", msg);
                        shared.events.dispatch("error", |h| h.on_error(&msg));
                        let online = {
                            let mut st = shared.proto.lock();
                            st.writefailures += 1;
                            st.online
                        };
                        if online || !link.is_connected() {
                            shared.handle_lost();
                            return;
                        }
                    }
                }
            }
            SendAction::HostCommand { line, layerchange } => {
                if let Some(z) = layerchange {
                    shared.events.dispatch("layerchange", |h| h.on_layerchange(z));
                }
                shared
                    .events
                    .dispatch("hostcommand", |h| h.on_hostcommand(&line));
                if line.trim_start().starts_with(";@pause") {
                    let mut st = shared.proto.lock();
                    if st.printing {
                        st.printing = false;
                        st.paused = true;
                        shared.cond.notify_all();
                    }
                }
            }
            SendAction::Skipped { layerchange } => {
                if let Some(z) = layerchange {
                    shared.events.dispatch("layerchange", |h| h.on_layerchange(z));
                }
            }
            SendAction::End => {
                shared.events.dispatch("end", |h| h.on_end());
            }
            SendAction::Idle => {}
        }
    }
}

/// Pick the next transmission with the lock held. Mutates the cursor, line
/// number, cache, and `clear` so the decision and its bookkeeping are one
/// atomic step; the I/O itself runs outside the lock.
fn next_action(st: &mut Proto, events: &EventDispatcher) -> SendAction {
    // 1. A pending resend draws from the cache, bytes unchanged.
    if let Some(rf) = st.resendfrom {
        if rf < st.lineno {
            if let Some(cached) = st.sentcache.get(&rf).cloned() {
                st.resendfrom = (rf + 1 < st.lineno).then_some(rf + 1);
                st.clear = false;
                let gline = GLine::parse(&cached);
                return SendAction::Write {
                    wire: cached,
                    gline,
                    printsend: None,
                    layerchange: None,
                };
            }
            tracing::warn!("no cached line for resend of {}", rf);
            st.resendfrom = (rf + 1 < st.lineno).then_some(rf + 1);
            return SendAction::Idle;
        }
        // 2. Caught up.
        st.resendfrom = None;
    }

    // 3. Priority commands go verbatim and do not consume the flow-control
    // slot; any reply they draw simply re-triggers `clear`.
    if let Some(command) = st.priqueue.pop_front() {
        let gline = GLine::parse(&command);
        return SendAction::Write {
            wire: command,
            gline,
            printsend: None,
            layerchange: None,
        };
    }

    // 4. Main queue.
    if st.printing {
        let index = st.queueindex;
        if index < st.mainqueue.len() {
            let layerchange = layer_crossing(&st.mainqueue, index);
            let gline = st.mainqueue.line(index).cloned().expect("cursor in range");

            let Some(processed) = events.dispatch_printpresend(&gline, index, &st.mainqueue)
            else {
                st.queueindex += 1;
                st.clear = true;
                return SendAction::Skipped { layerchange };
            };

            if processed.is_host_command() {
                st.queueindex += 1;
                st.clear = true;
                return SendAction::HostCommand {
                    line: processed.raw,
                    layerchange,
                };
            }

            let stripped = strip_comments(&processed.raw);
            if stripped.is_empty() {
                st.queueindex += 1;
                st.clear = true;
                return SendAction::Skipped { layerchange };
            }

            let framed = protocol::format_numbered(st.lineno, &stripped);
            // M110 lines reset the firmware's counter; replaying one from
            // the cache would corrupt the sequence, so they are never cached.
            if !stripped.contains("M110") {
                st.sentcache.insert(st.lineno, framed.clone());
            }
            st.lineno += 1;
            st.queueindex += 1;
            st.clear = false;
            return SendAction::Write {
                wire: framed,
                gline: processed.clone(),
                printsend: Some(processed),
                layerchange,
            };
        }

        // 5. Drained.
        st.printing = false;
        st.clear = true;
        if !st.paused {
            st.queueindex = 0;
        }
        return SendAction::End;
    }

    SendAction::Idle
}

/// Z of the layer the cursor crosses into at `index`, if it crosses one.
fn layer_crossing(mainqueue: &GCode, index: usize) -> Option<f64> {
    if index == 0 {
        return None;
    }
    let prev = mainqueue.layer_index_of(index - 1)?;
    let cur = mainqueue.layer_index_of(index)?;
    if prev == cur {
        return None;
    }
    mainqueue
        .all_layers()
        .get(cur as usize)
        .and_then(|layer| layer.z)
}
