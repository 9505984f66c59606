//! Shared read models and helpers for SDK integration tests.
#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use tributary_core::event::{Event, EventPayload, EventType};
use tributary_read_models::domain::context::{EmbeddingContext, ProjectionContext};
use tributary_read_models::domain::key_selector::KeySelector;
use tributary_read_models::domain::method::{Decoration, MethodDeclaration};
use tributary_read_models::domain::read_model::ReadModel;
use tributary_sdk::client::ClientBuilder;
use tributary_sdk::config::SdkConfig;
use uuid::Uuid;

pub const BOOK_BORROWED: Uuid = Uuid::from_u128(0x0de1_4a5e_0001);
pub const BOOK_RETURNED: Uuid = Uuid::from_u128(0x0de1_4a5e_0002);
pub const MEMBER_JOINED: Uuid = Uuid::from_u128(0x0de1_4a5e_0003);
pub const MEMBER_MOVED: Uuid = Uuid::from_u128(0x0de1_4a5e_0004);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookBorrowed {
    pub member: String,
}

impl Event for BookBorrowed {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookReturned {
    pub member: String,
}

impl Event for BookReturned {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberJoined {
    pub name: String,
    pub city: String,
}

impl Event for MemberJoined {
    fn declared_event_type() -> Option<EventType> {
        Some(EventType::new(MEMBER_JOINED))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberMoved {
    pub city: String,
}

impl Event for MemberMoved {
    fn declared_event_type() -> Option<EventType> {
        Some(EventType::new(MEMBER_MOVED))
    }
}

/// Projection: who currently holds a book.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BookLoan {
    pub holder: Option<String>,
    pub times_borrowed: u32,
}

impl ReadModel for BookLoan {
    fn methods() -> Vec<MethodDeclaration<Self>> {
        vec![
            MethodDeclaration::handling(
                "On",
                |loan: &mut Self, event: &BookBorrowed, _: &ProjectionContext| {
                    loan.holder = Some(event.member.clone());
                    loan.times_borrowed += 1;
                },
            )
            .with_key_selector(KeySelector::EventSourceId),
            MethodDeclaration::handling(
                "Returned",
                |loan: &mut Self, _: &BookReturned, _: &ProjectionContext| {
                    loan.holder = None;
                },
            )
            .decorated(Decoration::on())
            .with_key_selector(KeySelector::EventSourceId),
        ]
    }
}

/// Embedding: a library member mirrored from an external membership system.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Member {
    pub name: String,
    pub city: String,
}

impl ReadModel for Member {
    fn methods() -> Vec<MethodDeclaration<Self>> {
        vec![
            MethodDeclaration::handling(
                "On",
                |member: &mut Self, event: &MemberJoined, _: &ProjectionContext| {
                    member.name.clone_from(&event.name);
                    member.city.clone_from(&event.city);
                },
            ),
            MethodDeclaration::handling(
                "Moved",
                |member: &mut Self, event: &MemberMoved, _: &ProjectionContext| {
                    member.city.clone_from(&event.city);
                },
            )
            .decorated(Decoration::on()),
            MethodDeclaration::receiving_state(
                "ResolveUpdateToEvents",
                |current: &Self, received: &Self, _: &EmbeddingContext| {
                    if current.name.is_empty() {
                        return vec![EventPayload::new(MemberJoined {
                            name: received.name.clone(),
                            city: received.city.clone(),
                        })];
                    }
                    vec![EventPayload::new(MemberMoved {
                        city: received.city.clone(),
                    })]
                },
            ),
        ]
    }
}

/// Declares two `Update` methods and is always rejected.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UndecidedMember;

impl ReadModel for UndecidedMember {
    fn methods() -> Vec<MethodDeclaration<Self>> {
        vec![
            MethodDeclaration::handling(
                "On",
                |_: &mut Self, _: &MemberJoined, _: &ProjectionContext| {},
            ),
            MethodDeclaration::receiving_state(
                "Update",
                |_: &Self, _: &Self, _: &EmbeddingContext| Vec::<EventPayload>::new(),
            )
            .decorated(Decoration::update()),
            MethodDeclaration::receiving_state(
                "ResolveUpdateToEvents",
                |_: &Self, _: &Self, _: &EmbeddingContext| Vec::<EventPayload>::new(),
            ),
        ]
    }
}

/// A builder with every library event type registered.
pub fn library_builder() -> ClientBuilder {
    ClientBuilder::new(SdkConfig::default())
        .register_event::<BookBorrowed>(EventType::new(BOOK_BORROWED))
        .unwrap()
        .register_event::<BookReturned>(EventType::new(BOOK_RETURNED))
        .unwrap()
        .register_declared_event::<MemberJoined>()
        .unwrap()
        .register_declared_event::<MemberMoved>()
        .unwrap()
}
