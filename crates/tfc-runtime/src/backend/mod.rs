//! Inference backend implementations.

pub mod tensorflow;

use crate::error::RuntimeError;
use crate::{InputTensor, OutputTensor, Result};

/// Trait for graph inference backends.
///
/// Callers feed named arrays and get named arrays back without touching
/// runtime handles. Backends own raw handles, so the trait carries no
/// `Send`/`Sync` bound.
pub trait InferenceBackend {
    /// Run inference with the given inputs.
    ///
    /// # Arguments
    /// * `inputs` - Named input tensors, in any order
    ///
    /// # Returns
    /// Named output tensors from the model, in [`output_names`](Self::output_names) order
    fn run(&self, inputs: &[(&str, InputTensor)]) -> Result<Vec<(String, OutputTensor)>>;

    /// Get the input names expected by the model.
    fn input_names(&self) -> &[String];

    /// Get the output names produced by the model.
    fn output_names(&self) -> &[String];
}

/// Arrange named values in the order of `names`.
///
/// Every name must be fed exactly once; unknown names are rejected.
pub(crate) fn order_inputs<'a, T>(
    names: &[String],
    inputs: impl IntoIterator<Item = (&'a str, T)>,
) -> Result<Vec<T>> {
    let mut ordered: Vec<Option<T>> = names.iter().map(|_| None).collect();
    for (name, value) in inputs {
        let index = names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| RuntimeError::InvalidInput(format!("unknown input '{}'", name)))?;
        if ordered[index].replace(value).is_some() {
            return Err(RuntimeError::InvalidInput(format!(
                "input '{}' given more than once",
                name
            )));
        }
    }

    ordered
        .into_iter()
        .zip(names)
        .map(|(value, name)| {
            value.ok_or_else(|| RuntimeError::InvalidInput(format!("missing input '{}'", name)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_order_inputs_follows_model_order() {
        let expected = names(&["image", "mask", "scale"]);
        let ordered =
            order_inputs(&expected, [("scale", 3), ("image", 1), ("mask", 2)]).unwrap();
        assert_eq!(ordered, vec![1, 2, 3]);
    }

    #[test]
    fn test_order_inputs_rejects_unknown_name() {
        let err = order_inputs(&names(&["image"]), [("image", 1), ("labels", 2)]).unwrap_err();
        assert!(err.to_string().contains("unknown input 'labels'"));
    }

    #[test]
    fn test_order_inputs_rejects_missing_name() {
        let err = order_inputs(&names(&["image", "mask"]), [("mask", 2)]).unwrap_err();
        assert!(err.to_string().contains("missing input 'image'"));
    }

    #[test]
    fn test_order_inputs_rejects_duplicates() {
        let err = order_inputs(&names(&["image"]), [("image", 1), ("image", 2)]).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidInput(_)));
    }

    #[test]
    fn test_order_inputs_empty_model() {
        let ordered: Vec<u8> = order_inputs(&[], std::iter::empty()).unwrap();
        assert!(ordered.is_empty());
    }
}
