use bson::Bson;
use rand::seq::SliceRandom;
use rand::Rng;

/// Ordered list of document identifiers seen in one collection.
///
/// Filled once during warm-up and only read afterwards, by workload
/// operations picking realistic targets for point reads and updates.
/// Duplicates are kept and nothing is ever evicted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentifierCache {
    ids: Vec<Bson>,
}

impl IdentifierCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn push(&mut self, id: Bson) {
        self.ids.push(id);
    }

    pub fn get(&self, index: usize) -> Option<&Bson> {
        self.ids.get(index)
    }

    /// Picks a uniformly random identifier, `None` when the cache is empty.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Bson> {
        self.ids.choose(rng)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bson> {
        self.ids.iter()
    }

    pub fn as_slice(&self) -> &[Bson] {
        &self.ids
    }
}

impl FromIterator<Bson> for IdentifierCache {
    fn from_iter<I: IntoIterator<Item = Bson>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_preserves_insertion_order_and_duplicates() {
        let mut cache = IdentifierCache::new();
        cache.push(Bson::Int32(3));
        cache.push(Bson::Int32(1));
        cache.push(Bson::Int32(3));

        assert_eq!(cache.len(), 3);
        assert_eq!(
            cache.as_slice(),
            &[Bson::Int32(3), Bson::Int32(1), Bson::Int32(3)]
        );
    }

    #[test]
    fn test_choose() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(IdentifierCache::new().choose(&mut rng).is_none());

        let cache: IdentifierCache = (0..10).map(Bson::Int32).collect();
        for _ in 0..20 {
            let picked = cache.choose(&mut rng).unwrap();
            assert!(cache.iter().any(|id| id == picked));
        }
    }
}
