//! Randomized comparison against an in-memory ordered map
//!
//! Mixes puts, deletes and batches with compactions and reopens, checking
//! point reads and full scans in both directions along the way.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stratakv::{Engine, IteratorOptions, WriteBatch, WriteOptions};
use tempfile::TempDir;

use super::*;

type Model = BTreeMap<Vec<u8>, Vec<u8>>;

fn random_key(rng: &mut StdRng) -> Vec<u8> {
    format!("k{:04}", rng.gen_range(0..500)).into_bytes()
}

fn random_value(rng: &mut StdRng) -> Vec<u8> {
    let len = rng.gen_range(0..64);
    (0..len).map(|_| rng.gen()).collect()
}

fn verify(engine: &Engine, model: &Model) {
    let expected: Vec<_> = model.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    assert_eq!(collect(engine, IteratorOptions::default()), expected);

    let mut reversed = expected.clone();
    reversed.reverse();
    assert_eq!(collect(engine, IteratorOptions::default().reverse()), reversed);

    for i in (0..500).step_by(7) {
        let key = format!("k{:04}", i).into_bytes();
        assert_eq!(engine.get(&key).unwrap(), model.get(&key).cloned());
    }
}

fn run_model(seed: u64, config: impl Fn() -> stratakv::Config) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut model = Model::new();
    let mut engine = Engine::open(config()).unwrap();

    for step in 0..3000 {
        match rng.gen_range(0..10) {
            0..=5 => {
                let (key, value) = (random_key(&mut rng), random_value(&mut rng));
                engine.put(&key, &value).unwrap();
                model.insert(key, value);
            }
            6..=7 => {
                let key = random_key(&mut rng);
                engine.delete(&key).unwrap();
                model.remove(&key);
            }
            _ => {
                let mut batch = WriteBatch::new();
                for _ in 0..rng.gen_range(1..20) {
                    let key = random_key(&mut rng);
                    if rng.gen_bool(0.7) {
                        let value = random_value(&mut rng);
                        batch.put(key.clone(), value.clone());
                        model.insert(key, value);
                    } else {
                        batch.delete(key.clone());
                        model.remove(&key);
                    }
                }
                engine.write(batch, WriteOptions::default()).unwrap();
            }
        }

        if step % 1000 == 999 {
            verify(&engine, &model);
        }
        if step % 700 == 350 {
            engine.compact_range(None, None).unwrap();
        }
        if step % 900 == 450 {
            engine = reopen(engine, config());
        }
    }

    verify(&engine, &model);
    let engine = reopen(engine, config());
    verify(&engine, &model);
}

#[test]
fn test_model_default_config() {
    let temp = TempDir::new().unwrap();
    run_model(7, || builder(temp.path()).build());
}

#[test]
fn test_model_small_buffers() {
    let temp = TempDir::new().unwrap();
    run_model(42, || small_buffers(temp.path()));
}

#[test]
fn test_model_uncompressed_small_blocks() {
    let temp = TempDir::new().unwrap();
    run_model(1234, || {
        builder(temp.path())
            .compression(false)
            .block_size(128)
            .block_restart_interval(2)
            .write_buffer_size(8 * 1024)
            .build()
    });
}
