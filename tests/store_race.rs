use facebank::common::FaceBankError;
use facebank::storage::{Account, AccountStore, FsAccountStore};

use std::sync::{Arc, Barrier};
use std::thread;

// Several enrollments racing on the same phone number: exactly one may win,
// and the record on disk must be the winner's, intact.
#[test]
fn concurrent_creates_admit_exactly_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsAccountStore::new(dir.path()).unwrap());
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let account = Account::new(
                    "5551234567".to_string(),
                    format!("Contender {}", i),
                    "1990-01-01".to_string(),
                    Some(format!("[{}.0]", i)),
                );
                barrier.wait();
                store.create(&account).map(|_| i)
            })
        })
        .collect();

    let mut winners = Vec::new();
    let mut losers = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(i) => winners.push(i),
            Err(FaceBankError::DuplicateIdentifier(id)) => {
                assert_eq!(id, "5551234567");
                losers += 1;
            }
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(losers, 7);

    // The surviving record belongs to the winning thread
    let account = store.find_by_identifier("5551234567").unwrap().unwrap();
    assert_eq!(account.display_name, format!("Contender {}", winners[0]));
    assert_eq!(
        account.descriptor_json.as_deref(),
        Some(format!("[{}.0]", winners[0]).as_str())
    );
}
