//! Context assembly over real retrieval output: budgets, zones, and the
//! emitted string.

use maia_core::prelude::*;
use maia_e2e_tests::Pipeline;
use tokio_util::sync::CancellationToken;

fn retrieve_corpus() -> Vec<RetrievalResult> {
    let pipeline = Pipeline::new();
    pipeline.ingest(
        "facts",
        "agents",
        "The deployment pipeline runs integration tests before promoting any build to production",
        MemoryType::Semantic,
    );
    pipeline.ingest(
        "meeting",
        "agents",
        "In the deployment review we agreed to gate releases on the smoke suite",
        MemoryType::Episodic,
    );
    pipeline.ingest(
        "scratch",
        "agents",
        "current deployment attempt is waiting on the canary",
        MemoryType::Working,
    );
    pipeline
        .retriever
        .retrieve(
            "deployment process",
            &RetrieveOptions::default(),
            &CancellationToken::new(),
        )
        .unwrap()
        .items
}

/// A roomy budget admits everything verbatim under the Critical header.
#[test]
fn roomy_budget_keeps_content_verbatim() {
    let items = retrieve_corpus();
    assert_eq!(items.len(), 3);

    let output = ContextAssembler::new().assemble(&items, 4000);
    assert!(!output.truncated);
    assert_eq!(output.placements.len(), 3);
    for item in &items {
        assert!(output.content.contains(&item.memory.content));
    }
    assert!(output.content.starts_with("### Critical Context"));
    assert!(output.total_tokens <= 4000);
}

/// A tight budget without truncation never exceeds it and never splits a
/// memory.
#[test]
fn tight_budget_without_truncation() {
    let items = retrieve_corpus();
    let assembler = ContextAssembler::with_config(AssemblerConfig {
        allow_truncation: false,
        ..Default::default()
    });
    let output = assembler.assemble(&items, 30);

    assert!(output.total_tokens <= 30);
    assert!(!output.truncated);
    for placement in &output.placements {
        let item = items.iter().find(|i| i.memory.id == placement.id).unwrap();
        assert!(output.content.contains(&item.memory.content));
    }
}

/// No memory is ever placed in more than one zone.
#[test]
fn no_memory_spans_two_zones() {
    let items = retrieve_corpus();
    let output = ContextAssembler::new().assemble(&items, 60);

    let mut ids: Vec<&str> = output.placements.iter().map(|p| p.id.as_str()).collect();
    ids.sort();
    let before = ids.len();
    ids.dedup();
    assert_eq!(ids.len(), before);
}

/// Zone accounting adds up and stays within per-zone budgets.
#[test]
fn zone_accounting_is_consistent() {
    let items = retrieve_corpus();
    let output = ContextAssembler::new().assemble(&items, 100);

    let zones = [output.zones.critical, output.zones.middle, output.zones.recency];
    for zone in zones {
        assert!(zone.used <= zone.budget);
    }
    assert_eq!(
        output.total_tokens,
        output.zones.critical.used + output.zones.middle.used + output.zones.recency.used
    );
    let placed: usize = output.placements.iter().map(|p| p.tokens).sum();
    assert_eq!(placed, output.total_tokens);
}
