use std::sync::Arc;

use rand::Rng;

use pixdex::config::PixdexConfig;
use pixdex::embedding::{Embedder, PrecomputedEmbedder};
use pixdex::error::Result;
use pixdex::scope::{OwnerMap, Scope};
use pixdex::search::SearchHit;
use pixdex::service::SearchService;
use pixdex::storage::memory::MemoryStorage;

fn memory_service(dimension: usize) -> Result<SearchService> {
    memory_service_with(PrecomputedEmbedder::new(dimension))
}

fn memory_service_with(embedder: PrecomputedEmbedder) -> Result<SearchService> {
    let config = PixdexConfig {
        dimension: embedder.dimension(),
        ..PixdexConfig::default()
    };
    SearchService::with_storage(
        config,
        Arc::new(MemoryStorage::new_default()),
        Arc::new(embedder),
    )
}

fn random_vector(rng: &mut impl Rng, dimension: usize) -> Vec<f32> {
    (0..dimension).map(|_| rng.random_range(-1.0..1.0)).collect()
}

#[test]
fn higher_scoring_foreign_scope_wins_top_one() -> Result<()> {
    let service = memory_service(2)?;

    // Collection A belongs to owner 1, collection B to owner 2.
    service.create_scope(1, 100)?;
    service.create_scope(2, 200)?;
    let query = [1.0, 0.0];
    let a = [0.9, (1.0f32 - 0.81).sqrt()];
    let b = [0.95, (1.0f32 - 0.9025).sqrt()];
    service.ingest_vectors(1, 100, &[11], &[a.to_vec()])?;
    service.ingest_vectors(2, 200, &[22], &[b.to_vec()])?;

    let owners: OwnerMap = [(100, 1), (200, 2)].into_iter().collect();
    let results = service.search_vector(&query, &[100, 200], &owners, 1)?;

    assert_eq!(results.len(), 1);
    let hit = results.hits[0];
    assert_eq!(hit.external_id, 22);
    assert_eq!(hit.collection_id, 200);
    assert_eq!(hit.owner_id, 2);
    assert!((hit.score - 0.95).abs() < 1e-4);
    assert_eq!(results.stats.scopes_searched, 2);
    Ok(())
}

#[test]
fn federated_merge_matches_full_sort() -> Result<()> {
    let dimension = 8;
    let service = memory_service(dimension)?;
    let mut rng = rand::rng();

    let scopes = [Scope::new(1, 10), Scope::new(2, 20), Scope::new(3, 30)];
    for scope in scopes {
        service.create_scope(scope.owner_id, scope.collection_id)?;
        // Ids overlap across scopes to exercise the tie-break.
        let size = rng.random_range(5..40);
        let ids: Vec<i64> = (0..size).collect();
        let vectors: Vec<Vec<f32>> = ids
            .iter()
            .map(|_| random_vector(&mut rng, dimension))
            .collect();
        service.ingest_vectors(scope.owner_id, scope.collection_id, &ids, &vectors)?;
    }

    let owners: OwnerMap = scopes
        .iter()
        .map(|s| (s.collection_id, s.owner_id))
        .collect();
    let collections: Vec<u64> = scopes.iter().map(|s| s.collection_id).collect();

    for _ in 0..10 {
        let query = random_vector(&mut rng, dimension);
        let k = rng.random_range(1..50);

        let mut expected = Vec::new();
        for scope in scopes {
            for (id, score) in service.store().search(scope, &query, usize::MAX)? {
                expected.push(SearchHit::new(scope, id, score));
            }
        }
        expected.sort_by(|a, b| a.rank_cmp(b));
        expected.truncate(k);

        let results = service.search_vector(&query, &collections, &owners, k)?;
        assert_eq!(results.hits, expected);
    }
    Ok(())
}

#[test]
fn fewer_vectors_than_k_returns_all_of_them() -> Result<()> {
    let service = memory_service(3)?;
    service.create_scope(1, 10)?;
    service.ingest_vectors(
        1,
        10,
        &[1, 2, 3],
        &[vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]],
    )?;

    let owners: OwnerMap = "10:1".parse()?;
    let results = service.search_vector(&[1.0, 1.0, 0.0], &[10], &owners, 10)?;

    assert_eq!(results.len(), 3);
    assert!(
        results
            .hits
            .windows(2)
            .all(|pair| pair[0].score >= pair[1].score)
    );
    // 1 and 2 tie; the lower id ranks first.
    assert_eq!(results.hits[0].external_id, 1);
    assert_eq!(results.hits[1].external_id, 2);
    assert_eq!(results.hits[2].external_id, 3);
    Ok(())
}

#[test]
fn searches_with_nothing_to_search_return_empty() -> Result<()> {
    let service = memory_service(2)?;
    service.create_scope(1, 10)?;
    let owners: OwnerMap = "10:1,11:1".parse()?;
    let query = [1.0, 0.0];

    // No collections requested.
    assert!(service.search_vector(&query, &[], &owners, 5)?.is_empty());
    // k of zero.
    assert!(service.search_vector(&query, &[10], &owners, 0)?.is_empty());
    // An empty index.
    assert!(service.search_vector(&query, &[10], &owners, 5)?.is_empty());
    // A collection with an owner but no index.
    let results = service.search_vector(&query, &[11], &owners, 5)?;
    assert!(results.is_empty());
    assert_eq!(results.stats.scopes_skipped, 1);
    // A collection without an owner.
    let results = service.search_vector(&query, &[99], &owners, 5)?;
    assert!(results.is_empty());
    assert_eq!(results.stats.scopes_skipped, 1);
    Ok(())
}

#[test]
fn deleted_scope_is_skipped_by_later_searches() -> Result<()> {
    let service = memory_service(2)?;
    service.create_scope(1, 10)?;
    service.create_scope(2, 20)?;
    service.ingest_vectors(1, 10, &[1], &[vec![1.0, 0.0]])?;
    service.ingest_vectors(2, 20, &[2], &[vec![0.8, 0.2]])?;

    let owners: OwnerMap = "10:1,20:2".parse()?;
    let before = service.search_vector(&[1.0, 0.0], &[10, 20], &owners, 5)?;
    assert_eq!(before.len(), 2);

    service.delete_scope(1, 10)?;

    let after = service.search_vector(&[1.0, 0.0], &[10, 20], &owners, 5)?;
    assert_eq!(after.len(), 1);
    assert_eq!(after.hits[0].external_id, 2);
    assert_eq!(after.stats.scopes_skipped, 1);
    Ok(())
}

#[test]
fn wide_fan_out_matches_sequential_results() -> Result<()> {
    let dimension = 4;
    let service = memory_service(dimension)?;
    let mut rng = rand::rng();

    let mut owners = OwnerMap::new();
    let mut collections = Vec::new();
    for collection_id in 1..=20u64 {
        let owner_id = collection_id % 3;
        owners.insert(collection_id, owner_id);
        collections.push(collection_id);
        service.create_scope(owner_id, collection_id)?;
        let vectors: Vec<Vec<f32>> = (0..5).map(|_| random_vector(&mut rng, dimension)).collect();
        service.ingest_vectors(owner_id, collection_id, &[1, 2, 3, 4, 5], &vectors)?;
    }

    let query = random_vector(&mut rng, dimension);
    let all = service.search_vector(&query, &collections, &owners, 15)?;
    assert_eq!(all.len(), 15);
    assert_eq!(all.stats.scopes_searched, 20);

    // The same top hits come back when the collections arrive in pieces.
    let mut pieces = Vec::new();
    for chunk in collections.chunks(4) {
        pieces.extend(service.search_vector(&query, chunk, &owners, 15)?.hits);
    }
    pieces.sort_by(|a, b| a.rank_cmp(b));
    pieces.truncate(15);
    assert_eq!(all.hits, pieces);
    Ok(())
}

#[tokio::test]
async fn text_query_searches_with_its_embedding() -> Result<()> {
    let embedder = PrecomputedEmbedder::new(2).with_text("red shoes", vec![0.0, 1.0]);
    let service = memory_service_with(embedder)?;
    service.create_scope(5, 50)?;
    service.ingest_vectors(5, 50, &[1, 2], &[vec![1.0, 0.0], vec![0.1, 1.0]])?;

    let owners: OwnerMap = "50:5".parse()?;
    let results = service.search("red shoes", &[50], &owners, 1).await?;
    assert_eq!(results.hits[0].external_id, 2);

    let err = service
        .search("blue hat", &[50], &owners, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, pixdex::error::PixdexError::Embedding(_)));
    Ok(())
}
