//! End-to-end scenarios exercising the engine through [`Dispatcher`]
//! rather than any single subsystem in isolation.

use obix_core::dispatcher::Verb;
use obix_core::{CoreConfig, Request, Server};
use obix_model::node::{Node, NodeType};

fn device_payload(name: &str) -> Node {
    let obj = Node::new(NodeType::Obj, "");
    obj.set_name(name);
    let point = Node::new(NodeType::Real, "temp");
    point.set_name("temp");
    point.set_val("20.0");
    point.set_writable(true);
    obj.add_child(point);
    obj
}

#[test]
fn sign_up_then_read_back() {
    let server = Server::start(CoreConfig::default()).unwrap();
    let resp = server.handle(Request {
        verb: Verb::Post,
        href: "/obix/deviceRoot/signUp".to_string(),
        requester_id: "alice".to_string(),
        input: Some(device_payload("thermostat")),
    });
    assert_eq!(resp.name().as_deref(), Some("thermostat"));

    let read = server.handle(Request {
        verb: Verb::Get,
        href: "/obix/deviceRoot/thermostat".to_string(),
        requester_id: "alice".to_string(),
        input: None,
    });
    assert_eq!(read.children().len(), 1);
}

#[test]
fn write_then_watch_poll_sees_change() {
    let server = Server::start(CoreConfig::default()).unwrap();
    server.handle(Request {
        verb: Verb::Post,
        href: "/obix/deviceRoot/signUp".to_string(),
        requester_id: "alice".to_string(),
        input: Some(device_payload("thermostat")),
    });

    let watch = server.handle(Request {
        verb: Verb::Post,
        href: "/obix/watchService/make".to_string(),
        requester_id: "alice".to_string(),
        input: None,
    });
    let watch_href = watch.href();
    assert!(watch_href.starts_with("watchService/watch"));

    let watch_in = {
        let obj = Node::new(NodeType::Obj, "");
        obj.set_is("obix:WatchIn");
        let list = Node::new(NodeType::List, "");
        list.set_name("hrefs");
        let uri = Node::new(NodeType::Uri, "");
        uri.set_val("/obix/deviceRoot/thermostat/temp");
        list.add_child(uri);
        obj.add_child(list);
        obj
    };
    server.handle(Request {
        verb: Verb::Post,
        href: format!("/obix/{watch_href}/add"),
        requester_id: "alice".to_string(),
        input: Some(watch_in),
    });

    server.handle(Request {
        verb: Verb::Put,
        href: "/obix/deviceRoot/thermostat/temp".to_string(),
        requester_id: "alice".to_string(),
        input: Some({
            let v = Node::new(NodeType::Real, "");
            v.set_val("21.5");
            v
        }),
    });

    let poll = server.handle(Request {
        verb: Verb::Post,
        href: format!("/obix/{watch_href}/pollChanges"),
        requester_id: "alice".to_string(),
        input: None,
    });
    assert_eq!(poll.children().len(), 1);
}

#[test]
fn sign_off_requires_owner() {
    let server = Server::start(CoreConfig::default()).unwrap();
    server.handle(Request {
        verb: Verb::Post,
        href: "/obix/deviceRoot/signUp".to_string(),
        requester_id: "alice".to_string(),
        input: Some(device_payload("thermostat")),
    });

    let denied = server.handle(Request {
        verb: Verb::Post,
        href: "/obix/deviceRoot/thermostat/signOff".to_string(),
        requester_id: "mallory".to_string(),
        input: None,
    });
    assert_eq!(denied.is().as_deref(), Some("obix:PermissionErr"));

    let ok = server.handle(Request {
        verb: Verb::Post,
        href: "/obix/deviceRoot/thermostat/signOff".to_string(),
        requester_id: "alice".to_string(),
        input: None,
    });
    assert_ne!(ok.is().as_deref(), Some("obix:PermissionErr"));
}

#[test]
fn history_append_then_query() {
    let server = Server::start(CoreConfig::default()).unwrap();
    let get = server.handle(Request {
        verb: Verb::Post,
        href: "/obix/historyService/get".to_string(),
        requester_id: "alice".to_string(),
        input: Some({
            let uri = Node::new(NodeType::Uri, "");
            uri.set_val("/obix/deviceRoot/thermostat");
            uri
        }),
    });
    let history_href = get.href();

    let value = Node::new(NodeType::Real, "");
    value.set_name("value");
    value.set_val("22.0");
    let timestamp = Node::new(NodeType::Abstime, "");
    timestamp.set_name("timestamp");
    timestamp.set_val("2026-07-29T12:00:00Z");
    let record = Node::new(NodeType::Obj, "");
    record.set_is("obix:HistoryRecord");
    record.add_child(timestamp);
    record.add_child(value);

    let data = Node::new(NodeType::List, "");
    data.set_name("data");
    data.set_of("obix:HistoryRecord");
    data.add_child(record);

    let in_obj = Node::new(NodeType::Obj, "");
    in_obj.set_is("obix:HistoryAppendIn");
    in_obj.add_child(data);

    let append = server.handle(Request {
        verb: Verb::Post,
        href: format!("/obix/{history_href}/append"),
        requester_id: "alice".to_string(),
        input: Some(in_obj),
    });
    assert_eq!(append.is().as_deref(), Some("obix:HistoryAppendOut"));

    let query = server.handle(Request {
        verb: Verb::Post,
        href: format!("/obix/{history_href}/query"),
        requester_id: "alice".to_string(),
        input: None,
    });
    assert_eq!(query.is().as_deref(), Some("obix:HistoryQueryOut"));
}

#[test]
fn batch_runs_subrequests_in_order() {
    let server = Server::start(CoreConfig::default()).unwrap();
    server.handle(Request {
        verb: Verb::Post,
        href: "/obix/deviceRoot/signUp".to_string(),
        requester_id: "alice".to_string(),
        input: Some(device_payload("thermostat")),
    });

    let batch_in = {
        let obj = Node::new(NodeType::Obj, "");
        obj.set_is("obix:BatchIn");
        let list = Node::new(NodeType::List, "");
        for href in ["/obix/deviceRoot/thermostat", "/obix/deviceRoot/thermostat/temp"] {
            let item = Node::new(NodeType::Obj, "");
            let uri = Node::new(NodeType::Uri, "");
            uri.set_name("uri");
            uri.set_val(href);
            item.add_child(uri);
            list.add_child(item);
        }
        obj.add_child(list);
        obj
    };
    let out = server.handle(Request {
        verb: Verb::Post,
        href: "/obix/batch".to_string(),
        requester_id: "alice".to_string(),
        input: Some(batch_in),
    });
    assert_eq!(out.is().as_deref(), Some("obix:BatchOut"));
    assert_eq!(out.children().len(), 2);
}
