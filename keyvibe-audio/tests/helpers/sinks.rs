//! In-memory audio sinks

use keyvibe_audio::audio::{AudioSink, SinkStream, StreamSpec};
use keyvibe_audio::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// Everything one stream received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedStream {
    pub spec: StreamSpec,
    pub samples: Vec<i16>,
    pub writes: usize,
    pub drained: bool,
}

/// Records every stream opened on it
#[derive(Default)]
pub struct RecordingSink {
    streams: Arc<Mutex<Vec<RecordedStream>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn streams(&self) -> Vec<RecordedStream> {
        self.streams.lock().unwrap().clone()
    }
}

struct RecordingStream {
    streams: Arc<Mutex<Vec<RecordedStream>>>,
    index: usize,
}

impl AudioSink for RecordingSink {
    fn open(&self, spec: StreamSpec) -> Result<Box<dyn SinkStream>> {
        let mut streams = self.streams.lock().unwrap();
        streams.push(RecordedStream {
            spec,
            samples: Vec::new(),
            writes: 0,
            drained: false,
        });
        Ok(Box::new(RecordingStream {
            streams: Arc::clone(&self.streams),
            index: streams.len() - 1,
        }))
    }
}

impl SinkStream for RecordingStream {
    fn write(&mut self, samples: &[i16]) -> Result<()> {
        let mut streams = self.streams.lock().unwrap();
        let stream = &mut streams[self.index];
        stream.samples.extend_from_slice(samples);
        stream.writes += 1;
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        self.streams.lock().unwrap()[self.index].drained = true;
        Ok(())
    }
}

/// Sink whose streams block in `drain` until the gate opens
#[derive(Default)]
pub struct GatedSink {
    gate: Arc<(Mutex<bool>, Condvar)>,
    opened: AtomicUsize,
}

impl GatedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn open_gate(&self) {
        let (lock, cvar) = &*self.gate;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }
}

struct GatedStream {
    gate: Arc<(Mutex<bool>, Condvar)>,
}

impl AudioSink for GatedSink {
    fn open(&self, _spec: StreamSpec) -> Result<Box<dyn SinkStream>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(GatedStream {
            gate: Arc::clone(&self.gate),
        }))
    }
}

impl SinkStream for GatedStream {
    fn write(&mut self, _samples: &[i16]) -> Result<()> {
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        let (lock, cvar) = &*self.gate;
        let mut open = lock.lock().unwrap();
        while !*open {
            open = cvar.wait(open).unwrap();
        }
        Ok(())
    }
}

/// Sink that cannot open streams
#[derive(Default)]
pub struct FailingSink {
    attempts: AtomicUsize,
}

impl FailingSink {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl AudioSink for FailingSink {
    fn open(&self, _spec: StreamSpec) -> Result<Box<dyn SinkStream>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::Sink("device unplugged".to_string()))
    }
}
