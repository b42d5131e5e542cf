/// the named queues of the system. work flows down the task queues,
/// results and telemetry flow back up the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Queue {
    PreflopTasks,
    PostflopTasks,
    TaskResults,
    Heartbeats,
    Control,
}

impl Queue {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PreflopTasks => "preflop_tasks",
            Self::PostflopTasks => "postflop_tasks",
            Self::TaskResults => "task_results",
            Self::Heartbeats => "heartbeats",
            Self::Control => "control",
        }
    }
    pub fn key(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.name())
    }
}

impl std::fmt::Display for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_stable() {
        assert!(Queue::PreflopTasks.name() == "preflop_tasks");
        assert!(Queue::TaskResults.name() == "task_results");
        assert!(Queue::Control.key("solver:") == "solver:control");
    }
}
