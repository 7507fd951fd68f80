//! Integration tests for the record/replay engine
//!
//! Tests full record, save, reload and replay cycles through the scheduler,
//! replay determinism, and divergence handling.

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use crate::config::TimingConfig;
    use crate::context::AppContext;
    use crate::demo::{Command, DemoFile, DesyncPolicy, InputEvent};
    use crate::error::DemoError;
    use crate::proxy::{MemoryRegistry, SideEffectProxy};
    use crate::scheduler::{ManualClock, Scheduler};
    use crate::test_utils::{
        CountingFiles, ScriptedHost, TEST_SEED, record_session, record_with, replay_with,
    };

    const CFG_BYTES: [u8; 4] = [0x01, 0x02, 0x03, 0x04];

    fn session_script() -> Vec<(u32, InputEvent)> {
        vec![
            (0, InputEvent::MouseMove { x: 5, y: 3 }),
            (0, InputEvent::MouseDown { x: 5, y: 3, button: 1 }),
            (20, InputEvent::KeyDown(b'A')),
            (25, InputEvent::Close),
        ]
    }

    fn record_cfg_session() -> (DemoFile, ScriptedHost) {
        let files = CountingFiles::default().with_file("cfg", &CFG_BYTES);
        let io = SideEffectProxy::new(files, MemoryRegistry::new(), "");
        let host = ScriptedHost::with_script(session_script()).read_on_key(b'A', "cfg");
        record_with(host, io)
    }

    // ============================================================================
    // Record, save, reload, replay
    // ============================================================================

    #[test]
    fn test_recorded_stream_layout() {
        let (file, _) = record_cfg_session();
        assert_eq!(file.rng_seed, TEST_SEED);
        assert_eq!(file.total_ticks, 25);

        let commands = file.commands().unwrap();
        assert_eq!(
            commands,
            vec![
                (
                    0,
                    Command::VideoMode {
                        windowed: true,
                        refresh_rate: 60
                    }
                ),
                (0, Command::MouseDelta { dx: 5, dy: 3 }),
                (0, Command::MouseButton { down: true, button: 1 }),
                (0, Command::LoadingComplete),
                (15, Command::Idle),
                (20, Command::KeyDown(b'A')),
                (20, Command::FileRead(Some(CFG_BYTES.to_vec()))),
                (25, Command::Close),
            ]
        );
    }

    #[test]
    fn test_end_to_end_replay_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.dmo");

        let (file, recorded) = record_cfg_session();
        file.save(&path).unwrap();
        let loaded = DemoFile::load(&path).unwrap();
        assert_eq!(loaded, file);

        // The replay backend has no "cfg" at all
        let (replayed, ctx, backend_calls) =
            replay_with(loaded, ScriptedHost::new().read_on_key(b'A', "cfg"));

        assert_eq!(backend_calls, 0);
        assert_eq!(replayed.dispatched, recorded.dispatched);
        assert_eq!(replayed.rng_draws, recorded.rng_draws);
        assert_eq!(replayed.read_results, vec![(20, Some(CFG_BYTES.to_vec()))]);
        assert_eq!(replayed.read_results, recorded.read_results);
        assert_eq!(ctx.demo.update_count(), 25);
        assert!(ctx.demo.replay_finished());
    }

    #[test]
    fn test_replays_are_identical() {
        let (file, _) = record_cfg_session();

        let (first, _, _) = replay_with(file.clone(), ScriptedHost::new().read_on_key(b'A', "cfg"));
        let (second, _, _) = replay_with(file, ScriptedHost::new().read_on_key(b'A', "cfg"));

        assert_eq!(first.dispatched, second.dispatched);
        assert_eq!(first.rng_draws, second.rng_draws);
        assert_eq!(first.read_results, second.read_results);
        assert_eq!(first.updates, 25);
    }

    #[test]
    fn test_long_idle_stretch_replays_exactly() {
        let (file, recorded) = record_session(vec![
            (1, InputEvent::KeyDown(b'X')),
            (500, InputEvent::KeyUp(b'X')),
            (501, InputEvent::Close),
        ]);
        let idles = file
            .commands()
            .unwrap()
            .iter()
            .filter(|(_, c)| *c == Command::Idle)
            .count();
        assert_eq!(idles, 33);

        let (replayed, _, _) = replay_with(file, ScriptedHost::new());
        assert_eq!(replayed.dispatched, recorded.dispatched);
        assert_eq!(replayed.dispatched[1], (500, InputEvent::KeyUp(b'X')));
    }

    #[test]
    fn test_pointer_catch_up_replays_as_move() {
        let (file, recorded) = record_session(vec![
            (2, InputEvent::MouseDown { x: 300, y: 200, button: -1 }),
            (3, InputEvent::MouseUp { x: 300, y: 200, button: -1 }),
            (4, InputEvent::Close),
        ]);
        assert_eq!(
            recorded.dispatched[0],
            (2, InputEvent::MouseMove { x: 300, y: 200 })
        );

        let (replayed, _, _) = replay_with(file, ScriptedHost::new());
        assert_eq!(replayed.dispatched, recorded.dispatched);
    }

    #[test]
    fn test_off_screen_pointer_replays_as_dispatched() {
        let (file, recorded) = record_session(vec![
            (2, InputEvent::MouseMove { x: -100, y: 50 }),
            (3, InputEvent::MouseDown { x: -100, y: 50, button: 1 }),
            (4, InputEvent::MouseUp { x: 5000, y: 50, button: 1 }),
            (5, InputEvent::Close),
        ]);
        assert_eq!(
            recorded.dispatched,
            vec![
                (2, InputEvent::MouseMove { x: 0, y: 50 }),
                (3, InputEvent::MouseDown { x: 0, y: 50, button: 1 }),
                (4, InputEvent::MouseMove { x: 4095, y: 50 }),
                (4, InputEvent::MouseUp { x: 4095, y: 50, button: 1 }),
                (5, InputEvent::Close),
            ]
        );

        let (replayed, _, _) = replay_with(file, ScriptedHost::new());
        assert_eq!(replayed.dispatched, recorded.dispatched);
    }

    #[test]
    fn test_large_click_count_replays_as_dispatched() {
        let (file, recorded) = record_session(vec![
            (2, InputEvent::MouseDown { x: 0, y: 0, button: 4 }),
            (3, InputEvent::MouseUp { x: 0, y: 0, button: -7 }),
            (4, InputEvent::Close),
        ]);
        assert_eq!(
            recorded.dispatched[..2],
            [
                (2, InputEvent::MouseDown { x: 0, y: 0, button: 3 }),
                (3, InputEvent::MouseUp { x: 0, y: 0, button: -4 }),
            ]
        );

        let (replayed, _, _) = replay_with(file, ScriptedHost::new());
        assert_eq!(replayed.dispatched, recorded.dispatched);
    }

    // ============================================================================
    // Divergence
    // ============================================================================

    fn replay_without_read(policy: DesyncPolicy) -> (anyhow::Result<()>, AppContext) {
        let (file, _) = record_cfg_session();
        let files = CountingFiles::default();
        let calls = files.calls();
        let io = SideEffectProxy::new(files, MemoryRegistry::new(), "");
        let mut ctx = AppContext::replaying(file, io);
        ctx.demo.set_policy(policy);

        let mut sched = Scheduler::new(ManualClock::new(), &TimingConfig::default());
        let mut host = ScriptedHost::new();
        let result = sched.run(&mut ctx, &mut host).map(|_| ());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        (result, ctx)
    }

    #[test]
    fn test_unconsumed_read_is_fatal_by_default() {
        let (result, ctx) = replay_without_read(DesyncPolicy::Fatal);
        let err = result.unwrap_err();
        let demo_err = err.downcast_ref::<DemoError>().unwrap();
        assert!(demo_err.is_divergence());
        assert!(matches!(demo_err, DemoError::Sequence { tick: 20, .. }));
        assert_eq!(ctx.demo.update_count(), 20);
    }

    #[test]
    fn test_tolerant_replay_skips_unconsumed_read() {
        let (result, ctx) = replay_without_read(DesyncPolicy::Tolerate);
        result.unwrap();
        assert_eq!(ctx.demo.update_count(), 25);
    }
}
