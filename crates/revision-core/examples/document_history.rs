//! Walk a document through several revisions, then restore and exchange.
//!
//! Run with: `cargo run --example document_history`

use revision_core::{JsonCodec, Repository};

fn main() {
    let mut repo: Repository<String, JsonCodec> = Repository::new(JsonCodec);

    let drafts = [
        "# Notes\n\nThe quick brown fox jumps over the lazy dog.\n",
        "# Notes\n\nThe quick brown fox jumped over the lazy dog.\nA second paragraph appears.\n",
        "# Notes\n\nThe quick red fox jumped over the lazy dog.\nA second paragraph appears.\nAnd a third.\n",
    ];

    let mut revisions = Vec::new();
    for draft in &drafts {
        let rev = repo.make_snapshot(&draft.to_string()).unwrap();
        println!("snapshot {rev} ({} bytes total)", repo.size());
        revisions.push(rev);
    }

    // Older revisions are stored as reverse deltas but restore exactly.
    let first = repo.restore(&revisions[0]).unwrap();
    assert_eq!(first, drafts[0]);
    println!("\nrestored first draft:\n{first}");

    // Changes travel between stores as portable compressed patches.
    let patch = repo.patch_between(&revisions[0], &revisions[1]).unwrap();
    println!("portable patch: {} compressed bytes", patch.len());

    let mut other: Repository<String, JsonCodec> = Repository::new(JsonCodec);
    other
        .make_snapshot(&"# Notes\n\nThe quick brown fox jumps over the lazy cat.\n".to_string())
        .unwrap();
    let merged = other.apply_patch(&patch).unwrap();
    println!("\npatched drifted store:\n{merged}");
}
