use crate::backend::TransientKind;
use crate::catalog::ModelKind;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Loading { model: ModelKind },
    CacheMiss { model: ModelKind, reason: String },
    Retrying {
        model: ModelKind,
        attempt: u32,
        kind: TransientKind,
        delay: Duration,
    },
    Ready { model: ModelKind, from_cache: bool },
    Failed { model: ModelKind, message: String },
}

impl LifecycleEvent {
    pub fn model(&self) -> ModelKind {
        match self {
            LifecycleEvent::Loading { model }
            | LifecycleEvent::CacheMiss { model, .. }
            | LifecycleEvent::Retrying { model, .. }
            | LifecycleEvent::Ready { model, .. }
            | LifecycleEvent::Failed { model, .. } => *model,
        }
    }

    /// One-line status text for front-ends.
    pub fn status_line(&self) -> String {
        match self {
            LifecycleEvent::Loading { model } => format!("loading {}", model),
            LifecycleEvent::CacheMiss { model, .. } => {
                format!("downloading {}, this may take a while", model)
            }
            LifecycleEvent::Retrying { kind, delay, attempt, .. } => {
                format!("{}, retrying in {}s (attempt {})", kind, delay.as_secs(), attempt + 1)
            }
            LifecycleEvent::Ready { model, .. } => format!("{} ready", model),
            LifecycleEvent::Failed { model, message } => format!("{} failed: {}", model, message),
        }
    }
}

pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &LifecycleEvent);
}

impl<F> EventHandler for F
where
    F: Fn(&LifecycleEvent) + Send + Sync,
{
    fn handle(&self, event: &LifecycleEvent) {
        self(event)
    }
}
