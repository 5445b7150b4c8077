//! Scripted adapter used by the crate's unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{AdapterError, ChannelAdapter, ChannelCallback, PacketSource, SamplePacket};
use crate::prelude::RawBuffer;

pub(crate) type ScriptedPoll = Result<Option<Vec<u8>>, AdapterError>;

pub(crate) struct ScriptedAdapter {
    name: String,
    open_result: bool,
    open: AtomicBool,
    callback: Mutex<Option<Arc<dyn ChannelCallback>>>,
    sample_rate: AtomicU32,
    frequency: AtomicU64,
    packet_size: usize,
    pub fail_configuration: AtomicBool,
    pub linger: AtomicBool,
    polls: Mutex<VecDeque<ScriptedPoll>>,
    pub returned: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new(name: &str, open_result: bool) -> Self {
        Self {
            name: name.to_string(),
            open_result,
            open: AtomicBool::new(false),
            callback: Mutex::new(None),
            sample_rate: AtomicU32::new(1_000_000),
            frequency: AtomicU64::new(100_000_000),
            packet_size: 16,
            fail_configuration: AtomicBool::new(false),
            linger: AtomicBool::new(false),
            polls: Mutex::new(VecDeque::new()),
            returned: AtomicUsize::new(0),
        }
    }

    /// A source already open for pull-mode polling.
    pub fn polling(name: &str, polls: Vec<ScriptedPoll>) -> Self {
        let adapter = Self::new(name, true);
        adapter.open.store(true, Ordering::SeqCst);
        *adapter.polls.lock().unwrap() = polls.into();
        adapter
    }

    fn callback(&self) -> Arc<dyn ChannelCallback> {
        self.callback
            .lock()
            .unwrap()
            .clone()
            .expect("adapter was never opened")
    }

    pub fn emit(&self, buffer: RawBuffer) {
        self.callback().on_buffer_ready(buffer);
    }

    pub fn signal_ready(&self) {
        self.callback().on_ready();
    }

    pub fn signal_error(&self, message: &str) {
        self.callback().on_error(message);
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }
}

impl ChannelAdapter for ScriptedAdapter {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn open(&self, callback: Arc<dyn ChannelCallback>) -> bool {
        *self.callback.lock().unwrap() = Some(callback);
        self.open.store(self.open_result, Ordering::SeqCst);
        self.open_result
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::SeqCst)
    }

    fn packet_size(&self) -> usize {
        self.packet_size
    }

    fn frequency(&self) -> u64 {
        self.frequency.load(Ordering::SeqCst)
    }

    fn set_frequency(&self, frequency: u64) -> Result<(), AdapterError> {
        if self.fail_configuration.load(Ordering::SeqCst) {
            return Err(AdapterError::Hardware("tuner rejected frequency".into()));
        }
        self.frequency.store(frequency, Ordering::SeqCst);
        Ok(())
    }

    fn set_sample_rate(&self, sample_rate: u32) -> Result<(), AdapterError> {
        if self.fail_configuration.load(Ordering::SeqCst) {
            return Err(AdapterError::Hardware("rate not supported".into()));
        }
        self.sample_rate.store(sample_rate, Ordering::SeqCst);
        Ok(())
    }
}

impl PacketSource for ScriptedAdapter {
    fn get_packet(&self, timeout: Duration) -> Result<Option<Vec<u8>>, AdapterError> {
        let next = self.polls.lock().unwrap().pop_front();
        match next {
            Some(poll) => poll,
            None => {
                std::thread::sleep(timeout.min(Duration::from_millis(2)));
                // Exhausted scripts behave like a source that went away unless told to linger.
                if !self.linger.load(Ordering::SeqCst) {
                    self.open.store(false, Ordering::SeqCst);
                }
                Ok(None)
            }
        }
    }

    fn fill_sample_packet(
        &self,
        packet: &[u8],
        target: &mut SamplePacket,
    ) -> Result<usize, AdapterError> {
        if packet.len() % 2 != 0 {
            return Err(AdapterError::MalformedPacket("odd byte count".into()));
        }
        let mut added = 0;
        for pair in packet.chunks_exact(2) {
            let re = (pair[0] as f32 - 127.5) / 128.0;
            let im = (pair[1] as f32 - 127.5) / 128.0;
            if !target.push(re, im) {
                break;
            }
            added += 1;
        }
        Ok(added)
    }

    fn return_packet(&self, _packet: Vec<u8>) {
        self.returned.fetch_add(1, Ordering::SeqCst);
    }
}
