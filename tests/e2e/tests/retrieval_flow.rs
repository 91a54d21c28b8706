//! Full retrieval pipeline over the in-memory backends: fusion ordering,
//! filters, graph expansion, and query analysis.

use maia_core::prelude::*;
use maia_core::RetrieveError;
use maia_e2e_tests::Pipeline;
use tokio_util::sync::CancellationToken;

fn cancel() -> CancellationToken {
    CancellationToken::new()
}

/// Three semantic memories, queried for "machine learning", come back
/// complete and ordered strictly by combined score descending.
#[test]
fn fusion_ranks_all_candidates() {
    let pipeline = Pipeline::new();
    pipeline.ingest(
        "m1",
        "agents",
        "Machine learning is the study of algorithms that improve through experience",
        MemoryType::Semantic,
    );
    pipeline.ingest(
        "m2",
        "agents",
        "Deep neural networks are machine learning models with many layers",
        MemoryType::Semantic,
    );
    pipeline.ingest(
        "m3",
        "agents",
        "Natural language processing teaches machines to understand text",
        MemoryType::Semantic,
    );

    let response = pipeline
        .retriever
        .retrieve("machine learning", &RetrieveOptions::default(), &cancel())
        .unwrap();

    assert_eq!(response.items.len(), 3);
    for pair in response.items.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert!(response.items[0].score > response.items[2].score);
    assert!(response.query_time.as_secs() < 5);
}

/// Every emitted result satisfies every requested filter.
#[test]
fn filters_hold_on_every_result() {
    let pipeline = Pipeline::new();
    pipeline.ingest("s1", "work", "rust ownership notes", MemoryType::Semantic);
    pipeline.ingest("e1", "work", "yesterday we discussed rust lifetimes", MemoryType::Episodic);
    pipeline.ingest("s2", "home", "rust recipe experiments", MemoryType::Semantic);

    let opts = RetrieveOptions {
        namespace: Some("work".to_string()),
        types: vec![MemoryType::Episodic],
        ..Default::default()
    };
    let response = pipeline.retriever.retrieve("rust", &opts, &cancel()).unwrap();

    assert_eq!(response.items.len(), 1);
    let item = &response.items[0];
    assert_eq!(item.memory.id, "e1");
    assert_eq!(item.memory.namespace, "work");
    assert_eq!(item.memory.memory_type, MemoryType::Episodic);
}

/// Graph seeds pull in connected memories that neither text nor vector
/// search would surface, scored by cumulative weight over depth.
#[test]
fn graph_expansion_joins_the_mix() {
    let pipeline = Pipeline::new();
    let token = cancel();
    pipeline.ingest("root", "agents", "the incident retrospective", MemoryType::Episodic);
    pipeline.ingest("fix", "agents", "patched the connection pool", MemoryType::Semantic);
    pipeline.ingest("cause", "agents", "leaked file descriptors", MemoryType::Semantic);
    pipeline
        .graph
        .add_edge("root", "fix", Relation::References, 0.9, &token)
        .unwrap();
    pipeline
        .graph
        .add_edge("fix", "cause", Relation::CausedBy, 0.8, &token)
        .unwrap();

    let opts = RetrieveOptions {
        use_vector: false,
        use_text: false,
        use_graph: true,
        related_to: vec!["root".to_string()],
        graph_depth: 2,
        ..Default::default()
    };
    let response = pipeline.retriever.retrieve("", &opts, &token).unwrap();

    let ids: Vec<&str> = response.items.iter().map(|r| r.memory.id.as_str()).collect();
    assert!(ids.contains(&"fix"));
    assert!(ids.contains(&"cause"));
    let fix = response.items.iter().find(|r| r.memory.id == "fix").unwrap();
    let cause = response.items.iter().find(|r| r.memory.id == "cause").unwrap();
    assert!(fix.graph_score > cause.graph_score);
}

/// Deleting a record from the store silently drops it from retrieval even
/// while the stale ID is still present in the vector index.
#[test]
fn stale_index_entries_are_dropped() {
    let pipeline = Pipeline::new();
    pipeline.ingest("live", "agents", "alpha beta gamma", MemoryType::Semantic);
    pipeline.ingest("stale", "agents", "alpha beta delta", MemoryType::Semantic);
    pipeline.store.delete("stale").unwrap();

    let response = pipeline
        .retriever
        .retrieve("alpha beta", &RetrieveOptions::default(), &cancel())
        .unwrap();
    let ids: Vec<&str> = response.items.iter().map(|r| r.memory.id.as_str()).collect();
    assert_eq!(ids, vec!["live"]);
}

/// The analyzer classifies the canonical episodic question correctly.
#[test]
fn analyzer_classifies_episodic_question() {
    let analysis = QueryAnalyzer::new().analyze("What did we discuss last time?");

    assert_eq!(analysis.intent, QueryIntent::Question);
    assert!(analysis.context_types.contains(&MemoryType::Semantic));
    assert!(analysis.context_types.contains(&MemoryType::Episodic));
    assert!(analysis.confidence > 0.7);

    // An analysis attached to the options is informational and harmless.
    let pipeline = Pipeline::new();
    pipeline.ingest("m", "agents", "we discussed retries last time", MemoryType::Episodic);
    let opts = RetrieveOptions {
        analysis: Some(analysis),
        ..Default::default()
    };
    let response = pipeline
        .retriever
        .retrieve("What did we discuss last time?", &opts, &cancel())
        .unwrap();
    assert_eq!(response.items.len(), 1);
}

/// Cancellation propagates out of the pipeline as `Cancelled`.
#[test]
fn cancellation_propagates() {
    let pipeline = Pipeline::new();
    pipeline.ingest("m", "agents", "anything at all", MemoryType::Semantic);
    let token = cancel();
    token.cancel();
    assert!(matches!(
        pipeline
            .retriever
            .retrieve("anything", &RetrieveOptions::default(), &token),
        Err(RetrieveError::Cancelled)
    ));
}
