use async_trait::async_trait;
use routecore::{Node, NodeContext, NodeError, NodeKind, NodeSpec};
use routeruntime::{NodeFactory, NodeMetadata};

/// Returns its input unchanged
pub struct EchoNode;

#[async_trait]
impl Node for EchoNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Echo
    }

    async fn execute(&self, ctx: NodeContext) -> Result<String, NodeError> {
        ctx.events.info(format!("echo: {} bytes", ctx.input.len()));
        Ok(ctx.input)
    }
}

pub struct EchoNodeFactory;

impl NodeFactory for EchoNodeFactory {
    fn create(&self, _spec: &NodeSpec) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(EchoNode))
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Echo
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Passes input through unchanged".to_string(),
            category: "debug".to_string(),
        }
    }
}
