//! Demo: a small async client used from plain synchronous code.
//!
//! Run with: `cargo run -p tether --example client`
//!
//! Shows:
//! - a client listing its bridgeable operations explicitly
//! - synchronous calls on the main thread while nothing is running
//! - worker threads calling through a dedicated main executor
//! - a task inside a running executor receiving an awaitable instead
//! - deactivation restoring the raw async operations

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tether::{rt, Bridged, Capability, CapabilitySet, ExecutorConfig, Facade, LoopThread, Operation};

#[derive(Debug, Clone)]
struct Message {
    id: u64,
    text: String,
}

#[derive(Debug)]
enum ClientError {
    NotFound(u64),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::NotFound(chat) => write!(f, "chat {} not found", chat),
        }
    }
}

/// A pretend network client: every operation simulates latency with a timer.
struct Client {
    get_me: Facade<(), String, ClientError>,
    history: Facade<u64, Message, ClientError>,
}

impl Client {
    fn new(user: &str) -> Self {
        let user = user.to_string();
        Client {
            get_me: Facade::new("get_me", move |()| {
                let user = user.clone();
                Operation::awaitable(async move {
                    rt::sleep(Duration::from_millis(20)).await;
                    Ok(user)
                })
            }),
            history: Facade::new("history", |chat: u64| {
                if chat == 0 {
                    return Operation::sequence(stream::once(async move {
                        Err(ClientError::NotFound(chat))
                    }));
                }
                Operation::sequence(stream::iter(1..=3u64).then(move |id| async move {
                    rt::sleep(Duration::from_millis(5)).await;
                    Ok(Message {
                        id,
                        text: format!("message {} in chat {}", id, chat),
                    })
                }))
            }),
        }
    }
}

impl CapabilitySet for Client {
    fn capabilities(&mut self) -> Vec<&mut dyn Capability> {
        vec![&mut self.get_me, &mut self.history]
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── 1. Main thread, nothing running ─────────────────────────────
    let mut client = Client::new("alice");
    tether::activate(&mut client)?;

    if let Some(me) = client.get_me.call(())?.into_value() {
        println!("[main] get_me -> {}", me);
    }
    if let Some(drain) = client.history.call(42)?.into_drain() {
        for message in drain {
            let message = message?;
            println!("[main] history -> #{} {}", message.id, message.text);
        }
    }
    match client.history.call(0)?.into_drain() {
        Some(mut drain) => match drain.pull() {
            Err(err) => println!("[main] history(0) failed: {}", err),
            Ok(item) => println!("[main] history(0) unexpectedly yielded {:?}", item),
        },
        None => println!("[main] history(0) was not drained"),
    }
    tether::deactivate(&mut client);

    // ── 2. Workers calling through a dedicated main executor ────────
    let main = LoopThread::spawn(ExecutorConfig::default().with_name("client-main"))?;
    tether::activate_with(&mut client, main.executor().clone())?;
    let shared = Arc::new(client);

    let workers: Vec<_> = (1..=3u64)
        .map(|chat| {
            let client = shared.clone();
            thread::spawn(move || -> Result<usize, tether::Error<ClientError>> {
                let me = client.get_me.call(())?.into_value().unwrap_or_default();
                let count = match client.history.call(chat)?.into_drain() {
                    Some(drain) => drain.collect::<Result<Vec<_>, _>>()?.len(),
                    None => 0,
                };
                println!("[worker {}] {} read {} messages", chat, me, count);
                Ok(count)
            })
        })
        .collect();
    for worker in workers {
        match worker.join() {
            Ok(result) => {
                result?;
            }
            Err(_) => eprintln!("worker panicked"),
        }
    }

    // ── 3. Inside a running executor: an awaitable comes back ───────
    let executor = rt::registry::current()?;
    let client = shared.clone();
    let me = executor.block_on(async move {
        match client.get_me.call(()) {
            Ok(Bridged::Forward(forward)) => forward.await.ok(),
            Ok(Bridged::Raw(operation)) => match operation.into_awaitable() {
                Some(future) => future.await.ok(),
                None => None,
            },
            _ => None,
        }
    })?;
    println!("[task] awaited get_me -> {:?}", me);

    // ── 4. Deactivate: raw operations again ─────────────────────────
    let mut client = match Arc::try_unwrap(shared) {
        Ok(client) => client,
        Err(_) => return Err("client still shared".into()),
    };
    tether::deactivate(&mut client);
    if let Ok(Bridged::Raw(operation)) = client.get_me.call(()) {
        println!("[main] after deactivate get_me returns {:?}", operation.shape());
    }

    main.shutdown()?;
    Ok(())
}
