//! Built-in stick trees
//!
//! Precomputed trees shipped with the firmware. Each one reads a 50 × 6
//! flattened window (300 values).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::classifier::tree::Child::{Leaf as L, Node as N};
use crate::classifier::tree::{DecisionTree, Split};
use crate::classifier::Classifier;
use crate::error::AirdrumError;
use crate::{CLASS_COUNT, FLATTENED_LEN};

pub const LEFT: &str = "left";
pub const RIGHT: &str = "right";
pub const LEFT_STICK: &str = "left_stick";
pub const RIGHT_2: &str = "right_2";

const LEFT_NODES: [Split; 17] = [
    Split::new(146, -0.5661009848117828, N(1), N(2)),
    Split::new(32, -0.4818115085363388, L(0), L(1)),
    Split::new(187, -0.6529539823532104, N(3), N(10)),
    Split::new(247, -0.6609494984149933, N(4), N(7)),
    Split::new(98, -0.28472900390625, N(5), N(6)),
    Split::new(296, -0.28155550360679626, L(2), L(3)),
    Split::new(110, 0.021667500026524067, L(4), L(5)),
    Split::new(217, -0.6558839976787567, N(8), N(9)),
    Split::new(77, 44.58618927001953, L(6), L(7)),
    Split::new(195, 3.6621105074882507, L(8), L(9)),
    Split::new(157, -0.6719360053539276, N(11), N(13)),
    Split::new(197, 39.794921875, N(12), L(12)),
    Split::new(38, -0.2765499949455261, L(10), L(11)),
    Split::new(149, 14.404300689697266, N(14), L(17)),
    Split::new(221, 21.026615142822266, N(15), L(16)),
    Split::new(278, -0.16418449580669403, L(13), N(16)),
    Split::new(153, -2.777100592851639, L(14), L(15)),
];

const LEFT_LEAVES: [[f64; CLASS_COUNT]; 18] = [
    [0.0, 1.0, 0.0],
    [0.0, 0.4, 0.6],
    [0.0, 1.0, 0.0],
    [1.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [0.4, 0.6, 0.0],
    [1.0, 0.0, 0.0],
    [0.2, 0.0, 0.8],
    [0.0, 0.0, 1.0],
    [0.2, 0.2, 0.6],
    [0.8, 0.2, 0.0],
    [1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [0.0, 0.6, 0.4],
    [0.0, 0.0, 1.0],
    [0.0, 0.0, 1.0],
];

const RIGHT_NODES: [Split; 9] = [
    Split::new(19, -0.5087279975414276, N(1), N(7)),
    Split::new(264, 0.2947999984025955, N(2), N(5)),
    Split::new(164, 0.11511199921369553, N(3), N(4)),
    Split::new(171, -24.29199981689453, L(0), L(1)),
    Split::new(266, -0.19079599529504776, L(2), L(3)),
    Split::new(233, -58.89893341064453, L(4), N(6)),
    Split::new(259, -0.5972900092601776, L(5), L(6)),
    Split::new(175, -0.8533934950828552, L(7), N(8)),
    Split::new(265, -0.6979369819164276, L(8), L(9)),
];

const RIGHT_LEAVES: [[f64; CLASS_COUNT]; 10] = [
    [0.0, 0.4, 0.6],
    [0.0, 1.0, 0.0],
    [1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [0.2, 0.0, 0.8],
    [0.0, 0.8333333333333334, 0.16666666666666666],
    [0.6, 0.0, 0.4],
    [1.0, 0.0, 0.0],
];

const LEFT_STICK_NODES: [Split; 6] = [
    Split::new(278, -0.1757199987769127, N(1), N(2)),
    Split::new(188, 0.15112300217151642, L(0), L(1)),
    Split::new(108, 0.6574095189571381, N(3), N(4)),
    Split::new(80, 0.08630399778485298, L(2), L(3)),
    Split::new(12, 0.6967165172100067, L(4), N(5)),
    Split::new(67, -0.3919675052165985, L(5), L(6)),
];

const LEFT_STICK_LEAVES: [[f64; CLASS_COUNT]; 7] = [
    [0.0, 1.0, 0.0],
    [1.0, 0.0, 0.0],
    [0.0, 0.4, 0.6],
    [0.0, 0.0, 1.0],
    [0.0, 0.2857142857142857, 0.7142857142857143],
    [0.4, 0.6, 0.0],
    [1.0, 0.0, 0.0],
];

const RIGHT_2_NODES: [Split; 8] = [
    Split::new(36, 0.5671384930610657, N(1), N(5)),
    Split::new(93, -8.453370094299316, L(0), N(2)),
    Split::new(21, -7.904052972793579, N(3), N(4)),
    Split::new(144, 0.3271484971046448, L(1), L(2)),
    Split::new(266, 0.9555664956569672, L(3), L(4)),
    Split::new(202, -14.831546783447266, L(5), N(6)),
    Split::new(298, -19.4091796875, L(6), N(7)),
    Split::new(40, 12.695316314697266, L(7), L(8)),
];

const RIGHT_2_LEAVES: [[f64; CLASS_COUNT]; 9] = [
    [0.0, 0.0, 1.0],
    [0.0, 0.0, 1.0],
    [0.0, 0.4, 0.6],
    [0.0, 1.0, 0.0],
    [0.0, 0.8, 0.2],
    [1.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.4, 0.6, 0.0],
];

fn builtin_tree(
    name: &str,
    nodes: &[Split],
    leaves: &[[f64; CLASS_COUNT]],
) -> Result<DecisionTree, AirdrumError> {
    DecisionTree::new(name, FLATTENED_LEN, nodes.to_vec(), leaves.to_vec())
}

/// Named collection of trees a deployment can pick from per channel
#[derive(Debug, Clone, Default)]
pub struct TreeLibrary {
    trees: BTreeMap<String, Arc<DecisionTree>>,
}

impl TreeLibrary {
    /// Library holding the four shipped stick trees
    pub fn builtin() -> Result<Self, AirdrumError> {
        let mut library = TreeLibrary::default();
        library.insert(builtin_tree(LEFT, &LEFT_NODES, &LEFT_LEAVES)?);
        library.insert(builtin_tree(RIGHT, &RIGHT_NODES, &RIGHT_LEAVES)?);
        library.insert(builtin_tree(LEFT_STICK, &LEFT_STICK_NODES, &LEFT_STICK_LEAVES)?);
        library.insert(builtin_tree(RIGHT_2, &RIGHT_2_NODES, &RIGHT_2_LEAVES)?);
        Ok(library)
    }

    pub fn insert(&mut self, tree: DecisionTree) {
        self.trees.insert(tree.name().to_string(), Arc::new(tree));
    }

    pub fn get(&self, name: &str) -> Option<Arc<DecisionTree>> {
        self.trees.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.trees.keys().map(|k| k.as_str())
    }

    pub fn trees(&self) -> impl Iterator<Item = &Arc<DecisionTree>> {
        self.trees.values()
    }

    /// Look a tree up by name, falling back to loading a JSON file path
    pub fn resolve(&self, reference: &str) -> Result<Arc<DecisionTree>, AirdrumError> {
        if let Some(tree) = self.get(reference) {
            return Ok(tree);
        }

        let path = Path::new(reference);
        if path.extension().is_some_and(|ext| ext == "json") || path.exists() {
            let tree = DecisionTree::load(path)?;
            if tree.input_len() > FLATTENED_LEN {
                return Err(AirdrumError::InvalidTree(format!(
                    "{} expects {} inputs but windows flatten to {}",
                    reference,
                    tree.input_len(),
                    FLATTENED_LEN
                )));
            }
            return Ok(Arc::new(tree));
        }

        Err(AirdrumError::UnknownTree(reference.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn input_with(pairs: &[(usize, f64)]) -> Vec<f64> {
        let mut input = vec![0.0; FLATTENED_LEN];
        for &(i, v) in pairs {
            input[i] = v;
        }
        input
    }

    #[test]
    fn test_builtin_trees_are_valid() {
        let library = TreeLibrary::builtin().unwrap();
        let names: Vec<&str> = library.names().collect();
        assert_eq!(names, vec![LEFT, LEFT_STICK, RIGHT, RIGHT_2]);

        let shapes: Vec<(usize, usize)> = [LEFT, RIGHT, LEFT_STICK, RIGHT_2]
            .iter()
            .map(|n| {
                let s = library.get(n).unwrap().summary();
                (s.splits, s.leaves)
            })
            .collect();
        assert_eq!(shapes, vec![(17, 18), (9, 10), (6, 7), (8, 9)]);
    }

    #[test]
    fn test_left_stick_paths() {
        let tree = TreeLibrary::builtin().unwrap().get(LEFT_STICK).unwrap();

        // input[278] low, input[188] low
        let out = tree.classify(&input_with(&[(278, -1.0), (188, 0.0)]));
        assert_eq!(out.0, [0.0, 1.0, 0.0]);

        // input[278] high, input[108] low, input[80] high
        let out = tree.classify(&input_with(&[(80, 1.0)]));
        assert_eq!(out.0, [0.0, 0.0, 1.0]);

        // input[108] high, input[12] high, input[67] low
        let out = tree.classify(&input_with(&[(108, 1.0), (12, 1.0), (67, -1.0)]));
        assert_eq!(out.0, [0.4, 0.6, 0.0]);
        assert_eq!(out.argmax().id(), 1);
    }

    #[test]
    fn test_right_2_paths() {
        let tree = TreeLibrary::builtin().unwrap().get(RIGHT_2).unwrap();

        let out = tree.classify(&input_with(&[(36, 1.0), (202, -20.0)]));
        assert_eq!(out.argmax().id(), 0);

        let out = tree.classify(&input_with(&[(93, -10.0)]));
        assert_eq!(out.argmax().id(), 2);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let library = TreeLibrary::builtin().unwrap();
        let input: Vec<f64> = (0..FLATTENED_LEN).map(|i| ((i * 37) % 19) as f64 - 9.0).collect();
        for tree in library.trees() {
            let first = tree.classify(&input);
            for _ in 0..5 {
                let again = tree.classify(&input);
                assert_eq!(again, first);
                assert_eq!(again.argmax(), first.argmax());
            }
        }
    }

    #[test]
    fn test_resolve_unknown_name() {
        let library = TreeLibrary::builtin().unwrap();
        assert!(matches!(
            library.resolve("center"),
            Err(AirdrumError::UnknownTree(_))
        ));
    }

    #[test]
    fn test_resolve_from_file() {
        let library = TreeLibrary::builtin().unwrap();
        let exported = library.get(RIGHT).unwrap().to_json().unwrap();

        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(exported.as_bytes()).unwrap();

        let path = file.path().to_string_lossy().to_string();
        let loaded = library.resolve(&path).unwrap();
        assert_eq!(loaded.name(), RIGHT);
        assert_eq!(loaded.summary(), library.get(RIGHT).unwrap().summary());
    }
}
