//! Property-based tests for the single-active-loop guarantee

use hub_audit::guard::{PollGuard, PollLease};
use hub_audit::types::{HubId, JobKind};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Acquire(usize),
    DropLease(usize),
    Release(usize),
}

const KEYS: usize = 4;

fn key(index: usize) -> (HubId, JobKind) {
    let hub = HubId::parse(format!("hub-{}", index / 2)).unwrap();
    let kind = if index % 2 == 0 {
        JobKind::Primary
    } else {
        JobKind::Dependent
    };
    (hub, kind)
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..KEYS).prop_map(Op::Acquire),
        (0..KEYS).prop_map(Op::DropLease),
        (0..KEYS).prop_map(Op::Release),
    ]
}

/// No interleaving of acquire, drop and release leaves two live leases on
/// the same key.
#[test]
fn test_single_active_loop_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&prop::collection::vec(op(), 1..60), |ops| {
            let guard = PollGuard::new();
            let mut leases: Vec<Vec<PollLease>> = (0..KEYS).map(|_| Vec::new()).collect();

            for op in ops {
                match op {
                    Op::Acquire(i) => {
                        let (hub, kind) = key(i);
                        let had_live = leases[i].iter().any(|l| l.is_live());
                        match guard.try_acquire(&hub, kind) {
                            Some(lease) => {
                                prop_assert!(!had_live);
                                leases[i].push(lease);
                            }
                            None => prop_assert!(had_live),
                        }
                    }
                    Op::DropLease(i) => {
                        leases[i].pop();
                    }
                    Op::Release(i) => {
                        let (hub, kind) = key(i);
                        guard.release(&hub, kind);
                    }
                }

                for (i, held) in leases.iter().enumerate() {
                    let live = held.iter().filter(|l| l.is_live()).count();
                    prop_assert!(live <= 1);
                    let (hub, kind) = key(i);
                    prop_assert_eq!(live == 1, guard.is_active(&hub, kind));
                }
            }
            Ok(())
        })
        .unwrap();
}
