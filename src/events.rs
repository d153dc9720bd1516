//! Input event queue.
//!
//! Input is produced outside the control loop (a GPIO interrupt on a
//! board, a console reader thread on the host) and consumed by the main
//! loop between ticks.  Nothing here touches device state: the loop
//! drains the queue and feeds each event to the button driver or the
//! shutdown path, so input never runs concurrently with a tick.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ GPIO ISR    │────▶│  InputQueue  │────▶│  Main Loop   │
//! │ stdin thread│     │ (SPSC, fixed)│     │  (consumer)  │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```

use std::io::BufRead;
use std::time::Duration;

use heapless::spsc::{Consumer, Producer, Queue};
use log::{info, warn};

/// Capacity of the input queue (one slot stays free in an SPSC ring).
pub const INPUT_QUEUE_CAP: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// Raw button level changed (`true` = pressed).
    ButtonLevel(bool),
    /// Leave the main loop.
    Shutdown,
}

pub type InputQueue = Queue<InputEvent, INPUT_QUEUE_CAP>;
pub type InputProducer<'a> = Producer<'a, InputEvent, INPUT_QUEUE_CAP>;
pub type InputConsumer<'a> = Consumer<'a, InputEvent, INPUT_QUEUE_CAP>;

/// Push an event.  Returns `false` if the queue is full (event dropped).
pub fn push_input(producer: &mut InputProducer<'_>, event: InputEvent) -> bool {
    producer.enqueue(event).is_ok()
}

/// Drain all pending events into a callback, in FIFO order.
pub fn drain_inputs(consumer: &mut InputConsumer<'_>, mut handler: impl FnMut(InputEvent)) {
    while let Some(event) = consumer.dequeue() {
        handler(event);
    }
}

/// How long a console `click` holds the button down.
const CLICK_MS: u64 = 120;
/// Back-off while the queue is full of unread events.
const RETRY_MS: u64 = 20;

/// Console button commands from `reader` onto the queue: `down`, `up`,
/// `click`, and `quit`/`exit` to leave the main loop.
///
/// Only an explicit quit shuts the device down.  End of input just
/// stops the reader; the control loop keeps running without a button.
pub fn feed_console(reader: impl BufRead, producer: &mut InputProducer<'_>) {
    for line in reader.lines() {
        let Ok(line) = line else { break };
        let sent = match line.trim() {
            "down" => push_input(producer, InputEvent::ButtonLevel(true)),
            "up" => push_input(producer, InputEvent::ButtonLevel(false)),
            "click" => {
                let down = push_input(producer, InputEvent::ButtonLevel(true));
                std::thread::sleep(Duration::from_millis(CLICK_MS));
                down && push_input(producer, InputEvent::ButtonLevel(false))
            }
            "quit" | "exit" => {
                while !push_input(producer, InputEvent::Shutdown) {
                    std::thread::sleep(Duration::from_millis(RETRY_MS));
                }
                return;
            }
            "" => true,
            other => {
                warn!("Console: unknown command '{}' (down, up, click, quit)", other);
                true
            }
        };
        if !sent {
            warn!("Console: input queue full, command dropped");
        }
    }
    info!("Console: input closed, running without button");
}
