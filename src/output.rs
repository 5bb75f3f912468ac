/// The user-facing output stream. Status lines and the final confirmation go here, diagnostics go through `tracing`.
pub trait UserOutput: Send + Sync {
    fn write_line(&self, line: &str);
}

pub struct Stdout;

impl UserOutput for Stdout {
    fn write_line(&self, line: &str) {
        println!("{line}");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::UserOutput;
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct Recorder {
        lines: Mutex<Vec<String>>,
    }

    impl Recorder {
        pub(crate) fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.lines.lock().unwrap())
        }
    }

    impl UserOutput for Recorder {
        fn write_line(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
        }
    }
}
