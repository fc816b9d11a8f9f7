//! End-to-end: a field surfaced as a property, driven from the outside,
//! released mid-stream.
#![cfg(not(target_arch = "wasm32"))]

use tether::{
    channel, hub::Hub, is_interactive_thread, new_shared, Counted, LifetimeSource, Model,
    MutableProperty, Scheduler,
};

struct Document {
    title: Model<String>,
    life: LifetimeSource,
}

impl Document {
    fn new(title: &str) -> Document {
        Document {
            title: Model::new(title.to_string()),
            life: LifetimeSource::new(),
        }
    }
}

fn title_property(
    doc: &Counted<Document>,
    deliver: Option<Scheduler>,
) -> MutableProperty<Document, String> {
    MutableProperty::new(
        doc,
        doc.life.lifetime(),
        |d: &Document| d.title.get(),
        |d: &Document, v: String| {
            d.title.replace(v);
        },
        doc.title.changes(),
        deliver,
    )
}

#[test]
fn drive_a_field_until_its_owner_is_released() {
    let doc = Counted::new(Document::new("bar"));
    let title = title_property(&doc, None);

    let seen = new_shared(Vec::<String>::new());
    let completed = new_shared(false);
    let sink = seen.clone();
    let done = completed.clone();
    let _follow = title.replay().subscribe_with_close(
        move |v| sink.visit_mut(|s| s.push(v.clone())),
        move || done.visit_mut(|c| *c = true),
    );

    // drive the field from a channel the owner knows nothing about
    let (tx, rx) = channel::<String>();
    let _binding = title.write_target().bind(&rx);

    tx.send(&"foo".to_string());
    assert_eq!(title.get().as_deref(), Some("foo"));
    assert!(!completed.visit(|c| *c));

    drop(doc);
    assert_eq!(title.get(), None);
    assert!(completed.visit(|c| *c));

    // still bound to tx, yet nothing reaches the dead owner
    tx.send(&"baz".to_string());
    assert_eq!(
        seen.visit(|s| s.clone()),
        vec!["bar".to_string(), "foo".to_string()]
    );
}

#[test]
fn scheduled_writes_land_on_the_interactive_thread() {
    let doc = Counted::new(Document::new("bar"));
    let title = title_property(&doc, Some(Scheduler::Main));

    let (ack_tx, ack_rx) = std::sync::mpsc::channel::<(String, bool)>();
    let _sub = title.replay().subscribe(move |v| {
        let _ = ack_tx.send((v.clone(), is_interactive_thread()));
    });

    let (value, on_interactive) = ack_rx
        .recv_timeout(std::time::Duration::from_secs(5))
        .unwrap();
    assert_eq!(value, "bar");
    assert!(!on_interactive, "the snapshot replays on the subscriber");

    let target = title.write_target();
    std::thread::spawn(move || target.send("foo".to_string()))
        .join()
        .unwrap();

    let (value, on_interactive) = ack_rx
        .recv_timeout(std::time::Duration::from_secs(5))
        .unwrap();
    assert_eq!(value, "foo");
    assert!(on_interactive, "the write applies on the serial queue");
    assert_eq!(title.get().as_deref(), Some("foo"));
}

#[test]
fn a_named_notification_can_drive_a_property() {
    let hub = Hub::new();
    let doc = Counted::new(Document::new("bar"));
    let title = title_property(&doc, None);
    let _binding = title
        .write_target()
        .bind(&hub.changes::<String>("doc.title"));

    hub.post("doc.title", &"foo".to_string());
    assert_eq!(title.get().as_deref(), Some("foo"));

    drop(doc);
    hub.post("doc.title", &"baz".to_string());
    assert_eq!(title.get(), None);
}
