//! Route tree assembly and matching across nested mounts.

use http::Method;
use proptest::prelude::*;
use strata_router::{RouteError, RouteNode, RouteTree};

fn nested(depth: usize) -> (RouteNode<String>, String, Vec<String>) {
    let mut expected = Vec::new();
    let mut path = String::new();
    let mut node = RouteNode::new(format!("/l{depth}"))
        .unit(format!("u{depth}a"))
        .unit(format!("u{depth}b"))
        .route(Method::GET, "leaf/:id", "handler".to_string());

    for level in (0..depth).rev() {
        node = RouteNode::new(format!("/l{level}"))
            .unit(format!("u{level}a"))
            .mount(node);
    }

    for level in 0..=depth {
        path.push_str(&format!("/l{level}"));
        expected.push(format!("u{level}a"));
        if level == depth {
            expected.push(format!("u{level}b"));
        }
    }
    path.push_str("/leaf/42");
    expected.push("handler".to_string());

    (node, path, expected)
}

#[test]
fn test_chain_is_root_to_leaf_concatenation() {
    let (root, path, expected) = nested(3);
    let tree = RouteTree::build(root).unwrap();

    let matched = tree.match_route(&Method::GET, &path).unwrap();
    let chain: Vec<_> = matched.route.chain().iter().map(|l| l.unit.clone()).collect();

    assert_eq!(chain, expected);
    assert_eq!(matched.params.get("id"), Some("42"));
    assert_eq!(matched.route.scopes().len(), 4);
}

#[test]
fn test_conflict_across_sibling_mounts() {
    let root = RouteNode::new("/api")
        .mount(RouteNode::new("/users").route(Method::PUT, "user_:id", "a"))
        .mount(RouteNode::new("/").route(Method::PUT, "users/user_:uid", "b"));

    match RouteTree::build(root) {
        Err(RouteError::Conflict { method, .. }) => assert_eq!(method, "PUT"),
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[test]
fn test_listing_round_trips_to_same_handler() {
    let root = RouteNode::new("/api")
        .route(Method::GET, "", "index")
        .mount(
            RouteNode::new("/users")
                .route(Method::GET, "", "list")
                .route(Method::GET, ":id", "get")
                .route(Method::PUT, "user_:id", "update")
                .route(Method::GET, "me", "me"),
        );
    let tree = RouteTree::build(root).unwrap();

    for route in tree.routes() {
        let matched = tree.match_route(route.method(), route.path()).unwrap();
        assert_eq!(matched.route.handler(), route.handler(), "{}", route.path());
        assert_eq!(matched.route.index(), route.index());
    }
}

proptest! {
    #[test]
    fn prop_chain_concatenation(depth in 0usize..6) {
        let (root, path, expected) = nested(depth);
        let tree = RouteTree::build(root).unwrap();
        let matched = tree.match_route(&Method::GET, &path).unwrap();
        let chain: Vec<_> = matched.route.chain().iter().map(|l| l.unit.clone()).collect();
        prop_assert_eq!(chain, expected);
    }
}
