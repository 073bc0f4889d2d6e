// src/mapping/pool.rs
// ============================================================================
// TENSOR POOL - Consumo move-once de los tensores de origen
// ============================================================================
//
// Cada tensor del estado fusionado se mueve fuera del pool como mucho una vez.
// Al terminar, `finish` exige que no quede ninguno sin consumir.
//
// ============================================================================

use std::collections::{BTreeMap, HashSet};

use crate::error::{ConvertError, Result};
use crate::tensor::Tensor;

#[derive(Debug, Default)]
pub struct TensorPool {
    remaining: BTreeMap<String, Tensor>,
    consumed: HashSet<String>,
}

impl TensorPool {
    pub fn new(tensors: BTreeMap<String, Tensor>) -> Self {
        Self {
            remaining: tensors,
            consumed: HashSet::new(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.remaining.contains_key(name)
    }

    /// Mueve un tensor obligatorio fuera del pool
    pub fn take(&mut self, name: &str) -> Result<Tensor> {
        match self.take_if_present(name)? {
            Some(tensor) => Ok(tensor),
            None => Err(ConvertError::MissingTensor(name.to_string())),
        }
    }

    /// Mueve un tensor opcional fuera del pool
    pub fn take_if_present(&mut self, name: &str) -> Result<Option<Tensor>> {
        if let Some(tensor) = self.remaining.remove(name) {
            self.consumed.insert(name.to_string());
            return Ok(Some(tensor));
        }
        if self.consumed.contains(name) {
            return Err(ConvertError::AlreadyConsumed(name.to_string()));
        }
        Ok(None)
    }

    pub fn consumed_count(&self) -> usize {
        self.consumed.len()
    }

    /// Cierra el pool: error si algún tensor de origen no se usó
    pub fn finish(self) -> Result<usize> {
        if !self.remaining.is_empty() {
            return Err(ConvertError::UnconsumedTensors(
                self.remaining.into_keys().collect(),
            ));
        }
        Ok(self.consumed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(names: &[&str]) -> TensorPool {
        let t = Tensor::from_f32(vec![1], &[0.0]).unwrap();
        TensorPool::new(names.iter().map(|n| (n.to_string(), t.clone())).collect())
    }

    #[test]
    fn test_take_moves_once() {
        let mut p = pool(&["a", "b"]);
        assert!(p.take("a").is_ok());
        assert!(matches!(p.take("a"), Err(ConvertError::AlreadyConsumed(n)) if n == "a"));
        assert!(matches!(p.take("zzz"), Err(ConvertError::MissingTensor(n)) if n == "zzz"));
    }

    #[test]
    fn test_take_if_present() {
        let mut p = pool(&["a"]);
        assert!(p.take_if_present("missing").unwrap().is_none());
        assert!(p.take_if_present("a").unwrap().is_some());
        assert!(p.take_if_present("a").is_err());
    }

    #[test]
    fn test_finish_reports_leftovers() {
        let mut p = pool(&["a", "c", "b"]);
        p.take("a").unwrap();
        match p.finish() {
            Err(ConvertError::UnconsumedTensors(names)) => assert_eq!(names, vec!["b", "c"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_finish_counts_consumed() {
        let mut p = pool(&["a", "b"]);
        p.take("a").unwrap();
        p.take("b").unwrap();
        assert_eq!(p.consumed_count(), 2);
        assert_eq!(p.finish().unwrap(), 2);
    }
}
