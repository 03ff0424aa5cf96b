//! Batch execution (spec §4.6): runs an `obix:BatchIn` list of sub-requests
//! against the dispatcher in order, collecting results into a single
//! `obix:BatchOut`. Recursion guards block a batch from containing another
//! batch, a history query, or a `pollChanges`, each of which could block
//! indefinitely and defeat the whole point of batching (spec §4.6
//! invariant, §9 redesign note).

use obix_model::node::{Node, NodeType};
use obix_model::{contracts, path, ErrorKind, ObixError, Result};

use crate::dispatcher::{Dispatcher, Request, Verb};

struct SubRequest {
    verb: Verb,
    href: String,
    input: Option<Node>,
}

pub fn run(dispatcher: &Dispatcher, input: &Node, requester_id: &str) -> Result<Node> {
    let subs = parse_batch_in(input)?;
    let mut results = Vec::with_capacity(subs.len());
    for sub in subs {
        guard_against_nesting(&sub)?;
        let node = dispatcher.handle(Request {
            verb: sub.verb,
            href: sub.href,
            requester_id: requester_id.to_string(),
            input: sub.input,
        });
        results.push(node);
    }
    Ok(contracts::batch_out(results))
}

fn parse_batch_in(input: &Node) -> Result<Vec<SubRequest>> {
    let list = input
        .children()
        .into_iter()
        .find(|c| c.node_type() == NodeType::List)
        .ok_or_else(|| ObixError::invalid_input("BatchIn missing the uri list"))?;

    let mut subs = Vec::new();
    for item in list.children() {
        let href = item
            .children()
            .into_iter()
            .find(|c| c.name().as_deref() == Some("uri"))
            .and_then(|c| c.val())
            .ok_or_else(|| ObixError::invalid_input("BatchIn item missing uri"))?;
        if !path::is_valid_href(&href) {
            return Err(ObixError::invalid_href(format!("bad href '{href}' in batch")));
        }
        let verb_name = item
            .children()
            .into_iter()
            .find(|c| c.name().as_deref() == Some("op"))
            .and_then(|c| c.val())
            .unwrap_or_else(|| "read".to_string());
        let verb = match verb_name.as_str() {
            "read" => Verb::Get,
            "write" => Verb::Put,
            "invoke" => Verb::Post,
            other => return Err(ObixError::invalid_input(format!("unknown batch op '{other}'"))),
        };
        let body = item
            .children()
            .into_iter()
            .find(|c| c.name().as_deref() == Some("in"));
        subs.push(SubRequest { verb, href, input: body });
    }
    Ok(subs)
}

fn guard_against_nesting(sub: &SubRequest) -> Result<()> {
    if sub.verb != Verb::Post {
        return Ok(());
    }
    if sub.href.ends_with("/obix/batch") || sub.href == "/obix/batch" {
        return Err(ObixError::new(ErrorKind::BatchRecursive, "a batch cannot contain another batch"));
    }
    if sub.href.ends_with("/query") {
        return Err(ObixError::new(
            ErrorKind::BatchHistory,
            "a batch cannot contain a history query",
        ));
    }
    if sub.href.ends_with("/pollChanges") {
        return Err(ObixError::new(
            ErrorKind::BatchPollchanges,
            "a batch cannot contain pollChanges",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceRegistry;
    use crate::history::HistoryRegistry;
    use crate::sync::ptask::Scheduler;
    use crate::tree::ObjectTree;
    use crate::watch::WatchRegistry;
    use std::sync::Arc;

    fn batch_in(hrefs: &[&str]) -> Node {
        let obj = Node::new(NodeType::Obj, "");
        obj.set_is("obix:BatchIn");
        let list = Node::new(NodeType::List, "");
        for href in hrefs {
            let item = Node::new(NodeType::Obj, "");
            let uri = Node::new(NodeType::Uri, "");
            uri.set_name("uri");
            uri.set_val(href.to_string());
            item.add_child(uri);
            list.add_child(item);
        }
        obj.add_child(list);
        obj
    }

    fn make_dispatcher() -> Dispatcher {
        let tree = Arc::new(ObjectTree::new());
        let devices = Arc::new(DeviceRegistry::default());
        let scheduler = Arc::new(Scheduler::new());
        let watches = WatchRegistry::new(scheduler);
        let histories = Arc::new(HistoryRegistry::new(None));
        Dispatcher::new(tree, devices, watches, histories)
    }

    #[test]
    fn rejects_nested_batch() {
        let dispatcher = make_dispatcher();
        let input = batch_in(&["/obix/batch"]);
        let err = run(&dispatcher, &input, "alice").unwrap_err();
        assert_eq!(err.kind, ErrorKind::BatchRecursive);
    }

    #[test]
    fn runs_reads_in_order() {
        let dispatcher = make_dispatcher();
        let a = Node::new(NodeType::Int, "A");
        a.set_val("1");
        dispatcher.tree.root().add_child(a);
        let input = batch_in(&["/A", "/A"]);
        let out = run(&dispatcher, &input, "alice").unwrap();
        assert_eq!(out.children().len(), 2);
    }
}
