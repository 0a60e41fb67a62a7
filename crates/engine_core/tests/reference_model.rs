//! Randomised add/remove/kill sequences checked against a brute-force model.

use std::collections::{BTreeSet, HashMap};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use engine_core::{EcsError, Entity, Factory, FactoryDef, Query, World};

const FACTORIES: usize = 6;
const ENTITIES: u64 = 24;
const STEPS: usize = 3_000;

type Model = HashMap<Entity, BTreeSet<usize>>;

fn random_query(
    rng: &mut StdRng,
    factories: &[Factory<usize>],
) -> (Query, BTreeSet<usize>, BTreeSet<usize>) {
    let mut query = Query::new();
    let mut include = BTreeSet::new();
    let mut exclude = BTreeSet::new();
    for (i, factory) in factories.iter().enumerate() {
        match rng.gen_range(0..4) {
            0 => {
                query = query.with(factory);
                include.insert(i);
            }
            1 => {
                query = query.without(factory);
                exclude.insert(i);
            }
            _ => {}
        }
    }
    (query, include, exclude)
}

fn expected(model: &Model, include: &BTreeSet<usize>, exclude: &BTreeSet<usize>) -> BTreeSet<Entity> {
    model
        .iter()
        .filter(|(_, held)| held.is_superset(include) && held.is_disjoint(exclude))
        .map(|(&e, _)| e)
        .collect()
}

fn run(seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut world = World::new();
    let factories: Vec<Factory<usize>> = (0..FACTORIES)
        .map(|i| world.factory(FactoryDef::new(move |_: Entity, ()| i)))
        .collect();
    let mut model: Model = HashMap::new();

    // Long-lived queries exercise incremental maintenance.
    let standing: Vec<_> = (0..8).map(|_| random_query(&mut rng, &factories)).collect();
    for (query, _, _) in &standing {
        world.query(query).unwrap();
    }

    for step in 0..STEPS {
        let e = Entity::from_raw(rng.gen_range(0..ENTITIES));
        let f = rng.gen_range(0..FACTORIES);
        match rng.gen_range(0..10) {
            0..=4 => {
                let held = model.get(&e).is_some_and(|s| s.contains(&f));
                let result = factories[f].add(&mut world, e, ()).map(|c| *c);
                if held {
                    assert!(matches!(result, Err(EcsError::DuplicateComponent { .. })));
                } else {
                    assert_eq!(result.unwrap(), f);
                    model.entry(e).or_default().insert(f);
                }
            }
            5..=7 => {
                let result = factories[f].remove(&mut world, e, ());
                match model.get_mut(&e) {
                    None => assert!(matches!(result, Err(EcsError::UnknownEntity(_)))),
                    Some(held) => {
                        if held.remove(&f) {
                            result.unwrap();
                        } else {
                            assert!(matches!(result, Err(EcsError::MissingComponent { .. })));
                        }
                    }
                }
            }
            8 => {
                let result = world.kill(e);
                if model.remove(&e).is_some() {
                    result.unwrap();
                } else {
                    assert!(matches!(result, Err(EcsError::UnknownEntity(_))));
                }
            }
            _ => {
                let (query, include, exclude) = random_query(&mut rng, &factories);
                let got: BTreeSet<_> = world.query_entities(&query).unwrap().into_iter().collect();
                assert_eq!(got, expected(&model, &include, &exclude), "seed {seed} step {step}");
            }
        }

        // Every table matches the model exactly.
        if let Some(held) = model.get(&e) {
            let table = world.get(e).unwrap();
            let ids: BTreeSet<_> = table.factories().map(|id| id.index()).collect();
            assert_eq!(&ids, held, "seed {seed} step {step}");
            for &i in held {
                assert_eq!(table.get(&factories[i]), Some(&i));
            }
        } else {
            assert!(world.get(e).is_err());
        }
    }

    for (query, include, exclude) in &standing {
        let got: BTreeSet<_> = world.query_entities(query).unwrap().into_iter().collect();
        assert_eq!(got, expected(&model, include, exclude), "seed {seed} standing query");
    }
    assert_eq!(world.entity_count(), model.len());
}

#[test]
fn test_random_sequences_match_reference_model() {
    for seed in 0..8 {
        run(seed);
    }
}
