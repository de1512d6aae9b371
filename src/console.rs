use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use log::warn;

/// Line-oriented sink for probe output.
///
/// Cloning is cheap, clones write to the same underlying writer.
#[derive(Clone)]
pub struct Console {
    sink: Arc<Mutex<dyn Write + Send>>,
}

impl Console {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            sink: Arc::new(Mutex::new(writer)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub(crate) fn line(&self, args: fmt::Arguments<'_>) {
        let mut sink = match self.sink.lock() {
            Ok(sink) => sink,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(err) = sink.write_fmt(args).and_then(|_| sink.write_all(b"\n")) {
            warn!("failed to write output line, reason: {}", err);
            return;
        }
        let _ = sink.flush();
    }
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console").finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    use super::Console;

    /// Writer capturing everything a [`Console`] prints.
    #[derive(Clone, Default)]
    pub(crate) struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        pub(crate) fn console() -> (Console, Self) {
            let captured = Self::default();
            (Console::new(captured.clone()), captured)
        }

        pub(crate) fn lines(&self) -> Vec<String> {
            let bytes = self.0.lock().unwrap();
            String::from_utf8_lossy(&bytes)
                .lines()
                .map(str::to_owned)
                .collect()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
