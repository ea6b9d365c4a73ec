//! Serialized Earth Engine expression graphs.
//!
//! An [`Expression`] is a flat map of named [`ValueNode`]s plus the name of
//! the result. Nodes refer to each other by name (`valueReference`), and
//! function bodies are named values too.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One node of an expression graph.
///
/// Serializes externally tagged, e.g. `{"constantValue": 10}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueNode {
    ConstantValue(serde_json::Value),
    ValueReference(String),
    ArgumentReference(String),
    FunctionInvocationValue(FunctionInvocation),
    FunctionDefinitionValue(FunctionDefinition),
    ArrayValue(ArrayValue),
    DictionaryValue(DictionaryValue),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionInvocation {
    pub function_name: String,
    #[serde(default)]
    pub arguments: BTreeMap<String, ValueNode>,
}

/// A lambda; `body` names a value in the enclosing expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDefinition {
    pub argument_names: Vec<String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    pub values: Vec<ValueNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictionaryValue {
    pub values: BTreeMap<String, ValueNode>,
}

impl ValueNode {
    pub fn constant(value: impl Into<serde_json::Value>) -> Self {
        ValueNode::ConstantValue(value.into())
    }

    pub fn null() -> Self {
        ValueNode::ConstantValue(serde_json::Value::Null)
    }

    pub fn argument(name: impl Into<String>) -> Self {
        ValueNode::ArgumentReference(name.into())
    }

    /// Call a server-side algorithm with named arguments.
    pub fn invoke<'a>(
        function_name: &str,
        arguments: impl IntoIterator<Item = (&'a str, ValueNode)>,
    ) -> Self {
        ValueNode::FunctionInvocationValue(FunctionInvocation {
            function_name: function_name.to_string(),
            arguments: arguments
                .into_iter()
                .map(|(name, node)| (name.to_string(), node))
                .collect(),
        })
    }

    pub fn array(values: Vec<ValueNode>) -> Self {
        ValueNode::ArrayValue(ArrayValue { values })
    }

    pub fn dictionary<'a>(values: impl IntoIterator<Item = (&'a str, ValueNode)>) -> Self {
        ValueNode::DictionaryValue(DictionaryValue {
            values: values
                .into_iter()
                .map(|(name, node)| (name.to_string(), node))
                .collect(),
        })
    }

    /// Function name if this node is an invocation.
    pub fn function_name(&self) -> Option<&str> {
        match self {
            ValueNode::FunctionInvocationValue(f) => Some(&f.function_name),
            _ => None,
        }
    }

    /// Named argument if this node is an invocation.
    pub fn arg(&self, name: &str) -> Option<&ValueNode> {
        match self {
            ValueNode::FunctionInvocationValue(f) => f.arguments.get(name),
            _ => None,
        }
    }
}

/// A complete graph ready to send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub result: String,
    pub values: BTreeMap<String, ValueNode>,
}

impl Expression {
    /// Follow value references until a non-reference node.
    pub fn resolve<'a>(&'a self, node: &'a ValueNode) -> Option<&'a ValueNode> {
        let mut current = node;
        // bounded by the number of values so a cycle cannot loop forever
        for _ in 0..=self.values.len() {
            match current {
                ValueNode::ValueReference(name) => current = self.values.get(name)?,
                other => return Some(other),
            }
        }
        None
    }

    /// The result node, resolved.
    pub fn result_node(&self) -> Option<&ValueNode> {
        self.resolve(self.values.get(&self.result)?)
    }
}

/// Accumulates named values for an [`Expression`].
#[derive(Debug, Default)]
pub struct ExpressionBuilder {
    values: BTreeMap<String, ValueNode>,
}

impl ExpressionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a node and return its name.
    pub fn define(&mut self, node: ValueNode) -> String {
        let name = self.values.len().to_string();
        self.values.insert(name.clone(), node);
        name
    }

    /// Store a node and return a reference to it, so it can be shared.
    pub fn share(&mut self, node: ValueNode) -> ValueNode {
        ValueNode::ValueReference(self.define(node))
    }

    /// Define a one-argument function whose body is `body`.
    pub fn function(&mut self, argument: &str, body: ValueNode) -> ValueNode {
        let body = self.define(body);
        ValueNode::FunctionDefinitionValue(FunctionDefinition {
            argument_names: vec![argument.to_string()],
            body,
        })
    }

    pub fn build(mut self, result: ValueNode) -> Expression {
        let result = self.define(result);
        Expression {
            result,
            values: self.values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_serialization() {
        let node = ValueNode::invoke(
            "Image.normalizedDifference",
            [
                ("input", ValueNode::argument("image")),
                ("bandNames", ValueNode::constant(json!(["B8", "B4"]))),
            ],
        );
        assert_eq!(
            serde_json::to_value(&node).unwrap(),
            json!({
                "functionInvocationValue": {
                    "functionName": "Image.normalizedDifference",
                    "arguments": {
                        "bandNames": {"constantValue": ["B8", "B4"]},
                        "input": {"argumentReference": "image"}
                    }
                }
            })
        );
    }

    #[test]
    fn test_null_array_and_dictionary() {
        assert_eq!(serde_json::to_value(ValueNode::null()).unwrap(), json!({"constantValue": null}));
        assert_eq!(
            serde_json::to_value(ValueNode::array(vec![ValueNode::constant(1)])).unwrap(),
            json!({"arrayValue": {"values": [{"constantValue": 1}]}})
        );
        assert_eq!(
            serde_json::to_value(ValueNode::dictionary([("empty", ValueNode::constant(1))])).unwrap(),
            json!({"dictionaryValue": {"values": {"empty": {"constantValue": 1}}}})
        );
    }

    #[test]
    fn test_builder_functions_and_result() {
        let mut builder = ExpressionBuilder::new();
        let shared = builder.share(ValueNode::constant("COPERNICUS/S2"));
        let function = builder.function("x", ValueNode::argument("x"));
        let expr = builder.build(ValueNode::invoke(
            "Collection.map",
            [("collection", shared.clone()), ("baseAlgorithm", function)],
        ));

        assert_eq!(expr.values.len(), 3);
        let result = expr.result_node().unwrap();
        assert_eq!(result.function_name(), Some("Collection.map"));

        let json = serde_json::to_value(&expr).unwrap();
        let algorithm = &json["values"][&expr.result]["functionInvocationValue"]["arguments"]["baseAlgorithm"];
        assert_eq!(algorithm["functionDefinitionValue"]["argumentNames"], json!(["x"]));
        let body = algorithm["functionDefinitionValue"]["body"].as_str().unwrap();
        assert_eq!(json["values"][body], json!({"argumentReference": "x"}));

        assert_eq!(
            expr.resolve(&shared),
            Some(&ValueNode::constant("COPERNICUS/S2"))
        );
    }

    #[test]
    fn test_resolve_cycle() {
        let mut values = BTreeMap::new();
        values.insert("a".to_string(), ValueNode::ValueReference("b".to_string()));
        values.insert("b".to_string(), ValueNode::ValueReference("a".to_string()));
        let expr = Expression {
            result: "a".to_string(),
            values,
        };
        assert_eq!(expr.result_node(), None);
    }
}
