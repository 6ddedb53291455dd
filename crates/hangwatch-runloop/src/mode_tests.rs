    use super::*;

    #[test]
    fn test_phase_matches() {
        let activities = RunLoopPhase::Entry as u32 | RunLoopPhase::Exit as u32;
        assert!(RunLoopPhase::Entry.matches(activities));
        assert!(RunLoopPhase::Exit.matches(activities));
        assert!(!RunLoopPhase::BeforeWaiting.matches(activities));
    }

    #[test]
    fn test_phase_all() {
        assert!(RunLoopPhase::Entry.matches(RunLoopPhase::ALL));
        assert!(RunLoopPhase::BeforeTimers.matches(RunLoopPhase::ALL));
        assert!(RunLoopPhase::BeforeSources.matches(RunLoopPhase::ALL));
        assert!(RunLoopPhase::BeforeWaiting.matches(RunLoopPhase::ALL));
        assert!(RunLoopPhase::AfterWaiting.matches(RunLoopPhase::ALL));
        assert!(RunLoopPhase::Exit.matches(RunLoopPhase::ALL));
    }

    #[test]
    fn test_phase_iteration_mask() {
        assert!(RunLoopPhase::AfterWaiting.matches(RunLoopPhase::ITERATION));
        assert!(RunLoopPhase::BeforeWaiting.matches(RunLoopPhase::ITERATION));
        assert!(!RunLoopPhase::Entry.matches(RunLoopPhase::ITERATION));
        assert!(!RunLoopPhase::BeforeSources.matches(RunLoopPhase::ITERATION));
    }

    #[test]
    fn test_state_from_u8() {
        assert_eq!(RunLoopState::from(0), RunLoopState::Created);
        assert_eq!(RunLoopState::from(1), RunLoopState::Running);
        assert_eq!(RunLoopState::from(2), RunLoopState::Waiting);
        assert_eq!(RunLoopState::from(3), RunLoopState::Stopping);
        assert_eq!(RunLoopState::from(4), RunLoopState::Stopped);
        assert_eq!(RunLoopState::from(99), RunLoopState::Created);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(RunLoopState::Running.to_string(), "running");
        assert_eq!(RunLoopState::Waiting.to_string(), "waiting");
    }

    #[test]
    fn test_watchdog_state_round_trip() {
        assert_eq!(WatchdogState::from(WatchdogState::Idle as u8), WatchdogState::Idle);
        assert_eq!(
            WatchdogState::from(WatchdogState::Observing as u8),
            WatchdogState::Observing
        );
        assert_eq!(WatchdogState::from(42), WatchdogState::Idle);
        assert_eq!(WatchdogState::Observing.to_string(), "observing");
    }
