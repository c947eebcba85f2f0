//! End-to-end anti-entropy behavior: log acceptance, summary merges and
//! multi-replica convergence through the public API.

use std::sync::Arc;

use tsae::{
    exchange, OpKind, Operation, Replica, ReplicaConfig, ReplicaId, ReplicatedLog, Sequencing,
    Timestamp, TimestampMatrix, TimestampVector, Timestamped,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ids(names: &[&str]) -> Vec<ReplicaId> {
    names.iter().map(|s| s.to_string()).collect()
}

fn op(origin: &str, seq: i64) -> Operation {
    Operation::at(origin, seq, OpKind::put(format!("{}-{}", origin, seq), "v"))
}

fn vector(entries: &[(&str, i64)]) -> TimestampVector {
    let names: Vec<&str> = entries.iter().map(|(id, _)| *id).collect();
    let v = TimestampVector::new(&ids(&names)).unwrap();
    for (id, seq) in entries {
        v.update_timestamp(&Timestamp::new(*id, *seq));
    }
    v
}

fn seq(v: &TimestampVector, id: &str) -> i64 {
    v.get_last(id).unwrap().seq_number()
}

// ---------------------------------------------------------------------------
// Log
// ---------------------------------------------------------------------------

#[test]
fn duplicate_is_rejected_and_list_newer_returns_log_order() {
    let log = ReplicatedLog::new(&ids(&["A", "B"])).unwrap();

    assert!(log.add(op("A", 0)));
    assert!(!log.add(op("A", 0)));
    assert!(log.add(op("A", 1)));

    let summary = TimestampVector::new(&ids(&["A", "B"])).unwrap();
    let newer = log.list_newer(&summary);
    let seqs: Vec<i64> = newer.iter().map(|o| o.timestamp().seq_number()).collect();
    assert_eq!(seqs, vec![0, 1]);
    assert!(newer.iter().all(|o| o.origin() == "A"));
}

#[test]
fn list_newer_is_exactly_the_unseen_suffix() {
    let log = ReplicatedLog::new(&ids(&["A", "B", "C"])).unwrap();
    for seq in 0..5 {
        assert!(log.add(op("A", seq)));
        assert!(log.add(op("B", seq)));
    }
    assert!(log.add(op("C", 0)));

    let summary = vector(&[("A", 2), ("B", 4), ("C", -1)]);
    let mut newer: Vec<(String, i64)> = log
        .list_newer(&summary)
        .iter()
        .map(|o| (o.origin().to_string(), o.timestamp().seq_number()))
        .collect();
    newer.sort();

    assert_eq!(
        newer,
        vec![("A".to_string(), 3), ("A".to_string(), 4), ("C".to_string(), 0)]
    );
}

#[test]
fn gap_handling_depends_on_sequencing() {
    let lax = ReplicatedLog::new(&ids(&["A"])).unwrap();
    let strict = ReplicatedLog::with_sequencing(&ids(&["A"]), Sequencing::Contiguous).unwrap();

    for log in [&lax, &strict] {
        assert!(log.add(op("A", 0)));
    }

    assert!(lax.add(op("A", 3)));
    assert!(!strict.add(op("A", 3)));
    assert!(strict.add(op("A", 1)));
}

// ---------------------------------------------------------------------------
// Vectors
// ---------------------------------------------------------------------------

#[test]
fn update_timestamp_ignores_older() {
    let v = TimestampVector::new(&ids(&["A", "B"])).unwrap();
    assert!(v.get_last("A").unwrap().is_null());

    v.update_timestamp(&Timestamp::new("A", 5));
    assert_eq!(seq(&v, "A"), 5);

    v.update_timestamp(&Timestamp::new("A", 3));
    assert_eq!(seq(&v, "A"), 5);
}

#[test]
fn update_max_is_pointwise_max() {
    let v1 = vector(&[("A", 5), ("B", 2)]);
    let v2 = vector(&[("A", 3), ("B", 7)]);

    v1.update_max(&v2);
    assert_eq!(v1, vector(&[("A", 5), ("B", 7)]));

    // Monotonic: entries never drop below either input
    for id in ["A", "B"] {
        assert!(seq(&v1, id) >= seq(&v2, id));
    }
}

#[test]
fn merge_min_null_adopts_peer_value() {
    let v1 = vector(&[("A", 5), ("B", -1)]);
    let v2 = vector(&[("A", 3), ("B", 2)]);

    v1.merge_min(&v2);
    assert_eq!(v1, vector(&[("A", 3), ("B", 2)]));
}

#[test]
fn cloned_summary_is_detached() {
    let v = vector(&[("A", 1)]);
    let advertised = v.clone();

    v.update_timestamp(&Timestamp::new("A", 8));
    assert_eq!(seq(&advertised, "A"), 1);
}

// ---------------------------------------------------------------------------
// Replicas
// ---------------------------------------------------------------------------

fn group(n: usize, sequencing: Sequencing) -> Vec<Arc<Replica>> {
    let participants: Vec<ReplicaId> = (0..n).map(|i| format!("R{}", i)).collect();
    participants
        .iter()
        .map(|id| {
            let config =
                ReplicaConfig::new(id.clone(), participants.clone()).with_sequencing(sequencing);
            Arc::new(Replica::new(&config).unwrap())
        })
        .collect()
}

#[test]
fn ring_of_exchanges_converges() {
    let replicas = group(4, Sequencing::Lax);
    for (i, replica) in replicas.iter().enumerate() {
        for n in 0..=i {
            replica.generate(OpKind::put(format!("k{}", n), replica.id())).unwrap();
        }
    }

    // Two passes around the ring spread everything everywhere
    for _ in 0..2 {
        for i in 0..replicas.len() {
            let j = (i + 1) % replicas.len();
            exchange(&replicas[i], &replicas[j]).unwrap();
        }
    }

    let expected = replicas[0].log().digest().unwrap();
    for replica in &replicas {
        assert_eq!(replica.log().len(), 1 + 2 + 3 + 4);
        assert_eq!(replica.log().digest().unwrap(), expected);
        assert_eq!(replica.summary(), replicas[0].summary());
    }
}

#[test]
fn acknowledgements_reach_everyone() {
    let replicas = group(3, Sequencing::Contiguous);
    replicas[0].generate(OpKind::put("x", "1")).unwrap();
    replicas[1].generate(OpKind::put("y", "2")).unwrap();

    for _ in 0..2 {
        exchange(&replicas[0], &replicas[1]).unwrap();
        exchange(&replicas[1], &replicas[2]).unwrap();
        exchange(&replicas[2], &replicas[0]).unwrap();
    }

    for replica in &replicas {
        let stable = replica.ack().min_timestamp_vector().unwrap();
        assert_eq!(seq(&stable, "R0"), 0);
        assert_eq!(seq(&stable, "R1"), 0);
        assert!(stable.get_last("R2").unwrap().is_null());
        // Compaction is a no-op: nothing was purged
        assert_eq!(replica.log().len(), 2);
    }
}

#[test]
fn concurrent_generation_and_exchange() {
    let replicas = group(3, Sequencing::Contiguous);

    std::thread::scope(|s| {
        for replica in &replicas {
            s.spawn(move || {
                for n in 0..100 {
                    replica.generate(OpKind::put(format!("k{}", n), "v")).unwrap();
                }
            });
        }
        // Gossip while the generators are still running
        s.spawn(|| {
            for _ in 0..20 {
                exchange(&replicas[0], &replicas[1]).unwrap();
                exchange(&replicas[1], &replicas[2]).unwrap();
            }
        });
    });

    for _ in 0..2 {
        exchange(&replicas[0], &replicas[1]).unwrap();
        exchange(&replicas[1], &replicas[2]).unwrap();
        exchange(&replicas[2], &replicas[0]).unwrap();
    }

    for replica in &replicas {
        assert_eq!(replica.log().len(), 300);
    }
    assert_eq!(replicas[0].log(), replicas[1].log());
    assert_eq!(replicas[1].log(), replicas[2].log());
}

#[test]
fn matrix_travels_with_summary() {
    let participants = ids(&["A", "B"]);
    let ack = TimestampMatrix::new(&participants).unwrap();
    ack.update("A", &vector(&[("A", 3), ("B", 1)]));

    let json = serde_json::to_string(&ack).unwrap();
    let restored: TimestampMatrix = serde_json::from_str(&json).unwrap();
    assert_eq!(ack, restored);
}

#[test]
fn restarted_replica_resumes_after_recovered_history() {
    let replicas = group(2, Sequencing::Contiguous);
    replicas[0].generate(OpKind::put("x", "1")).unwrap();
    replicas[0].generate(OpKind::put("y", "2")).unwrap();
    exchange(&replicas[0], &replicas[1]).unwrap();

    // R0 comes back empty and recovers its own history from R1
    let participants = ids(&["R0", "R1"]);
    let config = ReplicaConfig::new("R0", participants).with_sequencing(Sequencing::Contiguous);
    let restarted = Replica::new(&config).unwrap();
    exchange(&restarted, &replicas[1]).unwrap();
    assert_eq!(restarted.log().len(), 2);

    let op = restarted.generate(OpKind::remove("x")).unwrap();
    assert_eq!(op.timestamp().seq_number(), 2);

    exchange(&restarted, &replicas[1]).unwrap();
    assert_eq!(replicas[1].log().len(), 3);
    assert_eq!(restarted.log(), replicas[1].log());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn generation_on_blocking_pool() {
    let replicas = group(3, Sequencing::Contiguous);

    let mut handles = Vec::new();
    for replica in &replicas {
        let replica = Arc::clone(replica);
        handles.push(tokio::task::spawn_blocking(move || {
            for n in 0..50 {
                replica.generate(OpKind::put(format!("k{}", n), "v")).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for replica in &replicas {
        let last = replica.log().last_timestamp(replica.id()).unwrap();
        assert_eq!(last.seq_number(), 49);
    }
}
