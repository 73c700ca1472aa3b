//! Built-in pages used when an application declares none

use super::{Component, Layout, PageProps, RenderContext};
use crate::error::RenderError;
use crate::vdom::Node;
use async_trait::async_trait;

pub struct DefaultNotFound;

#[async_trait]
impl Component for DefaultNotFound {
    async fn render(&self, _ctx: &RenderContext, props: &PageProps) -> Result<Node, RenderError> {
        Ok(Node::element("page")
            .with_child(Node::element("h1").with_child(Node::text("404 - Page Not Found")))
            .with_child(Node::text(format!("Nothing lives at {}", props.current_route))))
    }
}

pub struct DefaultError;

#[async_trait]
impl Component for DefaultError {
    async fn render(&self, _ctx: &RenderContext, props: &PageProps) -> Result<Node, RenderError> {
        let page = Node::element("page")
            .with_child(Node::element("h1").with_child(Node::text("Something went wrong")));
        let message = props
            .props
            .as_ref()
            .and_then(|p| p.get("message"))
            .and_then(|m| m.as_str());
        Ok(match message {
            Some(message) => page.with_child(Node::text(message)),
            None => page,
        })
    }
}

pub struct DefaultPage;

#[async_trait]
impl Component for DefaultPage {
    async fn render(&self, _ctx: &RenderContext, _props: &PageProps) -> Result<Node, RenderError> {
        Ok(Node::element("page").with_child(Node::text("Hello, welcome")))
    }
}

/// Renders its children unchanged
pub struct PassthroughLayout;

#[async_trait]
impl Layout for PassthroughLayout {
    async fn render(&self, _ctx: &RenderContext, children: Node) -> Result<Node, RenderError> {
        Ok(children)
    }
}
