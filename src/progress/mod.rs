use crate::events::{EventHandler, LifecycleEvent};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Terminal spinner that doubles as a lifecycle event handler.
pub struct Progress {
    spinner: ProgressBar,
}

impl Progress {
    pub fn spinner(message: &str) -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed}] {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        Self { spinner }
    }

    pub fn set_message(&self, message: &str) {
        self.spinner.set_message(message.to_string());
    }

    pub fn stop_and_clear(&self) {
        self.spinner.finish_and_clear();
    }
}

impl EventHandler for Progress {
    fn handle(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::Retrying { .. } => self.spinner.println(format!("[!] {}", event.status_line())),
            _ => self.set_message(&event.status_line()),
        }
    }
}
