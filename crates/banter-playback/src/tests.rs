use super::*;

fn seqs(segments: &[AudioSegment]) -> Vec<u64> {
    segments.iter().map(|s| s.seq).collect()
}

#[test]
fn in_order_completions_dispatch_immediately() {
    let mut q = PlaybackQueue::new();
    let a = q.register();
    let b = q.register();

    assert_eq!(seqs(&q.complete(a, b"a".to_vec())), vec![a]);
    assert_eq!(seqs(&q.complete(b, b"b".to_vec())), vec![b]);
    assert!(q.is_drained());
}

#[test]
fn playback_order_equals_request_order_not_completion_order() {
    let mut q = PlaybackQueue::new();
    let a = q.register();
    let b = q.register();
    let c = q.register();

    // The network delivered C's bytes first, then A, then B.
    assert!(q.complete(c, b"c".to_vec()).is_empty());
    assert_eq!(seqs(&q.complete(a, b"a".to_vec())), vec![a]);
    // B's arrival unblocks both B and the already-buffered C.
    let released = q.complete(b, b"b".to_vec());
    assert_eq!(seqs(&released), vec![b, c]);
    assert_eq!(released[0].audio, b"b");
    assert_eq!(released[1].audio, b"c");
}

#[test]
fn failed_slot_is_skipped_and_unblocks_successors() {
    let mut q = PlaybackQueue::new();
    let a = q.register();
    let b = q.register();
    let c = q.register();

    assert!(q.complete(b, b"b".to_vec()).is_empty());
    assert!(q.complete(c, b"c".to_vec()).is_empty());
    // A's synthesis fails: its audio is simply absent, B and C still play.
    assert_eq!(seqs(&q.fail(a)), vec![b, c]);
    assert!(q.is_drained());
}

#[test]
fn terminal_fires_once_and_only_when_drained_and_ended() {
    let mut q = PlaybackQueue::new();
    let a = q.register();

    // Not ended yet: draining alone is not terminal.
    q.complete(a, b"a".to_vec());
    assert!(!q.take_terminal());

    q.end_of_stream();
    assert!(q.take_terminal());
    // Exactly once.
    assert!(!q.take_terminal());
}

#[test]
fn end_signal_alone_is_not_terminal_while_audio_is_pending() {
    let mut q = PlaybackQueue::new();
    let a = q.register();
    q.end_of_stream();

    // A is still being synthesized.
    assert!(!q.take_terminal());
    assert!(q.is_active());

    q.complete(a, b"a".to_vec());
    assert!(q.take_terminal());
}

#[test]
fn late_registration_after_end_signal_holds_the_terminal_back() {
    let mut q = PlaybackQueue::new();
    let a = q.register();
    q.end_of_stream();
    let b = q.register();

    q.complete(a, b"a".to_vec());
    // B has not finished: no premature idle.
    assert!(!q.take_terminal());

    q.complete(b, b"b".to_vec());
    assert!(q.take_terminal());
    assert!(!q.take_terminal());
}

#[test]
fn empty_turn_is_terminal_as_soon_as_it_ends() {
    let mut q = PlaybackQueue::new();
    assert!(!q.take_terminal());
    q.end_of_stream();
    assert!(q.take_terminal());
}

#[test]
fn stale_completions_are_ignored() {
    let mut q = PlaybackQueue::new();
    let a = q.register();
    assert_eq!(seqs(&q.complete(a, b"a".to_vec())), vec![a]);

    // Duplicate completion and a seq that was never registered.
    assert!(q.complete(a, b"again".to_vec()).is_empty());
    assert!(q.complete(99, b"ghost".to_vec()).is_empty());
    assert!(q.fail(a).is_empty());
}

#[test]
fn is_active_tracks_undispatched_audio() {
    let mut q = PlaybackQueue::new();
    assert!(!q.is_active());

    let a = q.register();
    let b = q.register();
    assert!(q.is_active());

    q.complete(a, b"a".to_vec());
    assert!(q.is_active());

    q.complete(b, b"b".to_vec());
    assert!(!q.is_active());
}
