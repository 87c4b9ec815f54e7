use std::{
    io::Write,
    time::{Duration, Instant},
};

use anyhow::Result;
use chrono::Utc;

use crate::usecases::{
    chat_session::Notice,
    contracts::{AppEventSource, ChatOrchestrator},
};

use super::message_rendering::NoticeRenderer;

/// Upper bound on one wait so a quiet loop still ticks.
const IDLE_WAIT: Duration = Duration::from_millis(500);

/// Runs the chat loop until the orchestrator stops or the event source is
/// exhausted, printing every notice to `out`.
pub fn run(
    event_source: &mut dyn AppEventSource,
    orchestrator: &mut dyn ChatOrchestrator,
    renderer: &mut NoticeRenderer,
    out: &mut dyn Write,
    initial: &[Notice],
) -> Result<()> {
    print_notices(renderer, out, initial)?;

    while orchestrator.is_running() {
        let timeout = wait_timeout(orchestrator.next_deadline(), Instant::now());
        let Some(event) = event_source.next_event(timeout)? else {
            tracing::info!("event source closed");
            break;
        };

        let notices = orchestrator.handle_event(event, Instant::now(), Utc::now());
        print_notices(renderer, out, &notices)?;
    }

    Ok(())
}

pub fn print_notices(
    renderer: &mut NoticeRenderer,
    out: &mut dyn Write,
    notices: &[Notice],
) -> Result<()> {
    for notice in notices {
        for line in renderer.render(notice) {
            writeln!(out, "{line}")?;
        }
    }
    out.flush()?;
    Ok(())
}

fn wait_timeout(deadline: Option<Instant>, now: Instant) -> Duration {
    deadline
        .map(|deadline| deadline.saturating_duration_since(now))
        .map_or(IDLE_WAIT, |until| until.min(IDLE_WAIT))
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, FixedOffset};

    use super::*;
    use crate::{domain::events::AppEvent, ui::event_source::MockEventSource};

    #[derive(Default)]
    struct StubOrchestrator {
        handled: Vec<AppEvent>,
        stopped: bool,
        deadline: Option<Instant>,
    }

    impl ChatOrchestrator for StubOrchestrator {
        fn is_running(&self) -> bool {
            !self.stopped
        }

        fn next_deadline(&self) -> Option<Instant> {
            self.deadline
        }

        fn handle_event(
            &mut self,
            event: AppEvent,
            _now: Instant,
            _wall_clock: DateTime<Utc>,
        ) -> Vec<Notice> {
            self.stopped = event == AppEvent::QuitRequested;
            let notice = match &event {
                AppEvent::Input(line) => vec![Notice::Info(format!("echo {line}"))],
                _ => Vec::new(),
            };
            self.handled.push(event);
            notice
        }
    }

    fn renderer() -> NoticeRenderer {
        NoticeRenderer::new(FixedOffset::east_opt(0).expect("valid offset"))
    }

    #[test]
    fn loop_prints_notices_and_stops_on_quit() {
        let mut source = MockEventSource::from(vec![
            AppEvent::Input("hi".to_owned()),
            AppEvent::QuitRequested,
            AppEvent::Tick,
        ]);
        let mut orchestrator = StubOrchestrator::default();
        let mut out: Vec<u8> = Vec::new();

        run(
            &mut source,
            &mut orchestrator,
            &mut renderer(),
            &mut out,
            &[Notice::Info("welcome".to_owned())],
        )
        .expect("loop should run");

        assert_eq!(orchestrator.handled.len(), 2);
        assert_eq!(String::from_utf8(out).expect("utf8"), "welcome\necho hi\n");
    }

    #[test]
    fn loop_ends_when_source_is_exhausted() {
        let mut source = MockEventSource::from(vec![AppEvent::Tick]);
        let mut orchestrator = StubOrchestrator::default();

        run(&mut source, &mut orchestrator, &mut renderer(), &mut Vec::<u8>::new(), &[])
            .expect("loop should run");

        assert_eq!(orchestrator.handled, vec![AppEvent::Tick]);
        assert_eq!(source.timeouts, vec![IDLE_WAIT, IDLE_WAIT]);
    }

    #[test]
    fn wait_is_bounded_by_the_nearest_deadline() {
        let now = Instant::now();

        assert_eq!(wait_timeout(None, now), IDLE_WAIT);
        assert_eq!(
            wait_timeout(Some(now + Duration::from_millis(120)), now),
            Duration::from_millis(120)
        );
        assert_eq!(wait_timeout(Some(now + Duration::from_secs(5)), now), IDLE_WAIT);
        assert_eq!(wait_timeout(Some(now), now + Duration::from_secs(1)), Duration::ZERO);
    }
}
