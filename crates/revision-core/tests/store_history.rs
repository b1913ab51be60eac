use std::time::Duration;

use chrono::Utc;
use revision_core::{JsonCodec, Repository, RepositoryError, RevisionId};

fn string_repo() -> Repository<String, JsonCodec> {
    Repository::new(JsonCodec)
}

#[test]
fn test_delta_compaction_chain_with_patch_exchange() {
    let mut repo = string_repo();

    let rev1 = repo.make_snapshot(&"Wow".to_string()).unwrap();
    let expanded = repo.make_snapshot(&"World of Warcraft".to_string()).unwrap();
    repo.make_snapshot(&"World of Warcraft\n2".to_string()).unwrap();
    let expanded_wow3 = repo.make_snapshot(&"World of Warcraft\n3".to_string()).unwrap();
    repo.make_snapshot(&"Wow\n3".to_string()).unwrap();

    // The oldest revision restores through the whole delta chain.
    assert_eq!(repo.restore(&rev1).unwrap(), "Wow");

    // A patch carrying -Wow +World of Warcraft, applied while the latest is
    // "Wow\n3", produces "World of Warcraft\n3".
    let patch = repo.patch_between(&rev1, &expanded).unwrap();
    let patched = repo.apply_patch(&patch).unwrap();
    assert_eq!(patched, "World of Warcraft\n3");
    assert_eq!(repo.latest().unwrap(), "World of Warcraft\n3");

    // The new head's hash is identical to the earlier identical content.
    assert_eq!(repo.latest_revision(), Some(&expanded_wow3));
}

#[test]
fn test_every_history_entry_hashes_back_to_its_revision() {
    let mut repo = string_repo();
    let base = "the quick brown fox jumps over the lazy dog\n".repeat(5);
    for i in 0..7 {
        let value = format!("{base}edit {i}\n");
        repo.make_snapshot(&value).unwrap();
    }
    for rev in repo.history().to_vec() {
        let value = repo.restore(&rev).unwrap();
        let text = serde_json::to_string_pretty(&value).unwrap();
        assert_eq!(RevisionId::of_text(&text), rev);
    }
}

#[test]
fn test_revision_before_date() {
    let mut repo = string_repo();

    let too_early = Utc::now();
    std::thread::sleep(Duration::from_millis(5));

    repo.make_snapshot(&"Wow".to_string()).unwrap();
    let expanded = repo.make_snapshot(&"World of Warcraft".to_string()).unwrap();

    std::thread::sleep(Duration::from_millis(5));
    let cutoff = Utc::now();
    std::thread::sleep(Duration::from_millis(5));

    repo.make_snapshot(&"World of Warcraft 34343".to_string()).unwrap();
    repo.make_snapshot(&"World of Warcraft 34343".to_string()).unwrap();
    repo.make_snapshot(&"World of Warcraft 3343433".to_string()).unwrap();

    assert_eq!(repo.revision_before(cutoff).unwrap(), expanded);
    assert_eq!(
        repo.restore_before(cutoff).unwrap(),
        repo.restore(&expanded).unwrap()
    );

    // Nothing is old enough for a date before the first snapshot.
    assert!(matches!(
        repo.revision_before(too_early),
        Err(RepositoryError::NoRevisionBefore(_))
    ));
}

#[test]
fn test_storage_stays_compact_over_many_edits() {
    let mut repo = string_repo();
    let mut document = "lorem ipsum dolor sit amet\n".repeat(40);
    repo.make_snapshot(&document).unwrap();
    let full = repo.size();

    for i in 0..15 {
        document.push_str(&format!("appended line {i}\n"));
        repo.make_snapshot(&document).unwrap();
    }

    // Sixteen revisions of a growing document cost far less than sixteen
    // complete copies.
    assert!(repo.size() < full * 4, "size {} vs full {}", repo.size(), full);

    // And every revision still restores to the right prefix.
    let first = repo.history()[0].clone();
    assert_eq!(repo.restore(&first).unwrap(), "lorem ipsum dolor sit amet\n".repeat(40));
}

#[test]
fn test_optimize_after_scattered_edits() {
    let mut repo = string_repo();
    let base = "paragraph one\nparagraph two\nparagraph three\n".repeat(5);
    let mut values = Vec::new();
    for i in 0..12 {
        // Alternate between two families of edits so nearest-neighbor deltas
        // beat the default previous-only compaction.
        let value = if i % 2 == 0 {
            format!("{base}even tail {i}\n")
        } else {
            format!("{base}odd tail {i}\n")
        };
        repo.make_snapshot(&value).unwrap();
        values.push(value);
    }

    let before = repo.size();
    repo.optimize().unwrap();
    assert!(repo.size() <= before);

    for (rev, value) in repo.history().to_vec().iter().zip(&values) {
        assert_eq!(&repo.restore(rev).unwrap(), value);
    }
}

#[test]
fn test_apply_patch_on_empty_repository_fails() {
    let mut source = string_repo();
    let a = source.make_snapshot(&"a".to_string()).unwrap();
    let b = source.make_snapshot(&"b".to_string()).unwrap();
    let patch = source.patch_between(&a, &b).unwrap();

    let mut empty = string_repo();
    assert!(matches!(
        empty.apply_patch(&patch),
        Err(RepositoryError::EmptyHistory)
    ));
}
