//! The eight static system templates cloned by [`super::ObjectTree::insert_template`]
//! (spec §4.1). The C original loads these from `sys/*.xml`; here they are
//! built directly since the XML parser/DOM library is out of scope (spec
//! §1) and the shapes are small and stable. [`super::ObjectTree::load_bootstrap`]
//! still merges any `sys/server_*.xml` found on disk on top of these
//! defaults, so a deployment can still override them.

use std::collections::HashMap;

use obix_model::node::{Node, NodeType};

pub const ERROR: &str = "error";
pub const FATAL_ERROR: &str = "fatal-error";
pub const WATCH: &str = "watch";
pub const WATCH_OUT: &str = "watch-out";
pub const BATCH_OUT: &str = "batch-out";
pub const HISTORY_DEVICE: &str = "history-device";
pub const HISTORY_ABSTRACT: &str = "history-abstract";
pub const HISTORY_APPEND_OUT: &str = "history-append-out";

pub fn builtin() -> HashMap<String, Node> {
    let mut map = HashMap::new();
    map.insert(ERROR.to_string(), error_template());
    map.insert(FATAL_ERROR.to_string(), fatal_error_template());
    map.insert(WATCH.to_string(), watch_template());
    map.insert(WATCH_OUT.to_string(), watch_out_template());
    map.insert(BATCH_OUT.to_string(), batch_out_template());
    map.insert(HISTORY_DEVICE.to_string(), history_device_template());
    map.insert(HISTORY_ABSTRACT.to_string(), history_abstract_template());
    map.insert(HISTORY_APPEND_OUT.to_string(), history_append_out_template());
    map
}

fn error_template() -> Node {
    let n = Node::new(NodeType::Obj, "");
    n.set_name("err");
    n.set_is("obix:BadUriErr");
    n.set_val("");
    n
}

fn fatal_error_template() -> Node {
    let n = Node::new(NodeType::Obj, "");
    n.set_name("err");
    n.set_is("obix:UnsupportedErr");
    n.set_val("server fault: error contract construction failed");
    n
}

fn watch_template() -> Node {
    let watch = Node::new(NodeType::Obj, "");
    watch.set_is("obix:Watch");

    let lease = Node::new(NodeType::Reltime, "");
    lease.set_name("lease");
    lease.set_val("PT1M");
    lease.set_writable(true);
    watch.add_child(lease);

    let poll_wait = Node::new(NodeType::Obj, "");
    poll_wait.set_name("pollWaitInterval");
    poll_wait.set_is("obix:PollWaitInterval");
    let min = Node::new(NodeType::Reltime, "");
    min.set_name("min");
    min.set_val("PT0S");
    min.set_writable(true);
    let max = Node::new(NodeType::Reltime, "");
    max.set_name("max");
    max.set_val("PT10S");
    max.set_writable(true);
    poll_wait.add_child(min);
    poll_wait.add_child(max);
    watch.add_child(poll_wait);

    let add = op_node("add", "obix:WatchIn", "obix:WatchOut", 2);
    let remove = op_node("remove", "obix:WatchIn", "obix:WatchOut", 3);
    let poll_changes = op_node("pollChanges", "", "obix:WatchOut", 4);
    let poll_refresh = op_node("pollRefresh", "", "obix:WatchOut", 5);
    let delete = op_node("delete", "", "", 6);
    watch.add_child(add);
    watch.add_child(remove);
    watch.add_child(poll_changes);
    watch.add_child(poll_refresh);
    watch.add_child(delete);

    watch
}

fn op_node(name: &str, of_in: &str, of_out: &str, op_id: u32) -> Node {
    let op = Node::new(NodeType::Op, name);
    op.set_name(name);
    if !of_in.is_empty() {
        op.set_of(of_in);
    } else if !of_out.is_empty() {
        op.set_of(of_out);
    }
    op.set_op_id(op_id);
    op
}

fn watch_out_template() -> Node {
    let n = Node::new(NodeType::List, "");
    n.set_is("obix:WatchOut");
    n.set_name("values");
    n
}

fn batch_out_template() -> Node {
    let n = Node::new(NodeType::List, "");
    n.set_is("obix:BatchOut");
    n
}

fn history_device_template() -> Node {
    let n = Node::new(NodeType::Obj, "");
    n.set_is("obix:HistoryDeviceAbstract");
    n
}

fn history_abstract_template() -> Node {
    let n = Node::new(NodeType::Obj, "");
    n.set_is("obix:HistoryFileAbstract");
    for field in ["date", "count", "start", "end"] {
        let child = Node::new(
            if field == "count" {
                NodeType::Int
            } else if field == "date" {
                NodeType::Abstime
            } else {
                NodeType::Abstime
            },
            "",
        );
        child.set_name(field);
        n.add_child(child);
    }
    n
}

fn history_append_out_template() -> Node {
    let n = Node::new(NodeType::Obj, "");
    n.set_is("obix:HistoryAppendOut");
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_all_eight() {
        let map = builtin();
        for key in [
            ERROR,
            FATAL_ERROR,
            WATCH,
            WATCH_OUT,
            BATCH_OUT,
            HISTORY_DEVICE,
            HISTORY_ABSTRACT,
            HISTORY_APPEND_OUT,
        ] {
            assert!(map.contains_key(key), "missing template {key}");
        }
    }
}
