//! Consumer ↔ provider scenarios through the full stack

use access::{Closure, Handle, IoctlCode, ItemState, OmmError, OmmErrorKind};
use anyhow::{Context, Result};
use e2e_tests::{
    item_refresh, item_update, validate_item_stream, validate_recovery, Observed, RecordingClient,
    TestConfig, TestFramework, Transport,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use types::{PostMsg, ReqMsg};

const UPDATES: u32 = 50;

fn ibm() -> ReqMsg {
    ReqMsg::new().service_name("DIRECT_FEED").name("IBM.N")
}

fn refresh_then_ordered_updates(transport: Transport) -> Result<()> {
    let framework = TestFramework::new(TestConfig::over(transport))?;
    let consumer = framework.consumer()?;
    let client = Arc::new(RecordingClient::new());
    let handle = consumer.register_client(ibm(), client.clone(), Closure::none())?;

    framework.wait_until("IBM.N refresh", || {
        client.count(|o| matches!(o, Observed::Refresh { .. })) == 1
    })?;
    let published = framework.feed().handle("IBM.N").context("provider saw no request")?;
    for seq in 1..=UPDATES {
        framework
            .provider()?
            .submit(item_update(seq, 100 + i64::from(seq)), published.raw())?;
    }
    framework.wait_until("all updates", || {
        client.count(|o| matches!(o, Observed::Update { .. })) == UPDATES as usize
    })?;

    validate_item_stream(&client.observed(), handle, UPDATES)?;
    assert_eq!(consumer.item_state(handle), Some(ItemState::Open));
    Ok(())
}

#[test_log::test]
fn ibm_refresh_then_updates_over_memory() -> Result<()> {
    refresh_then_ordered_updates(Transport::Memory)
}

#[test_log::test]
fn ibm_refresh_then_updates_over_tcp() -> Result<()> {
    refresh_then_ordered_updates(Transport::Tcp)
}

#[test_log::test]
fn batch_of_three_opens_with_its_last_member() -> Result<()> {
    let framework = TestFramework::new(TestConfig::default())?;
    framework.feed().hold("MSFT.O");
    let consumer = framework.consumer()?;
    let client = Arc::new(RecordingClient::new());
    let request = ReqMsg::new()
        .service_name("DIRECT_FEED")
        .batch_names(["IBM.N", "TRI.N", "MSFT.O"])?;
    let batch = consumer.register_client(request, client.clone(), Closure::none())?;

    framework.wait_until("three requests at the provider", || framework.feed().requests() == 3)?;
    framework.wait_until("two member refreshes", || client.observed().len() == 2)?;
    assert_ne!(consumer.item_state(batch), Some(ItemState::Open));

    let held = framework.feed().handle("MSFT.O").context("MSFT.O was not requested")?;
    framework.provider()?.submit(item_refresh("MSFT.O", 400), held.raw())?;
    framework.wait_until("batch open", || consumer.item_state(batch) == Some(ItemState::Open))?;

    let members: HashSet<Handle> = client
        .observed()
        .iter()
        .map(|o| match o {
            Observed::Refresh { handle, parent, .. } => {
                assert_eq!(*parent, Some(batch));
                *handle
            }
            other => panic!("unexpected callback {other:?}"),
        })
        .collect();
    assert_eq!(members.len(), 3);
    for member in members {
        assert_eq!(consumer.item_state(member), Some(ItemState::Open));
    }
    Ok(())
}

#[test_log::test]
fn channel_loss_marks_items_suspect_until_recovered() -> Result<()> {
    let mut framework = TestFramework::new(TestConfig::default())?;
    let consumer = framework.consumer()?;
    let client = Arc::new(RecordingClient::new());
    let first = consumer.register_client(ibm(), client.clone(), Closure::none())?;
    let second = consumer.register_client(
        ReqMsg::new().service_name("DIRECT_FEED").name("TRI.N"),
        client.clone(),
        Closure::none(),
    )?;
    framework.wait_until("both refreshes", || client.observed().len() == 2)?;

    framework.stop_provider();
    framework.wait_until("both items suspect", || {
        consumer.item_state(first) == Some(ItemState::Suspect)
            && consumer.item_state(second) == Some(ItemState::Suspect)
    })?;
    framework.wait_until("a status callback per open item", || {
        client.count(|o| matches!(o, Observed::Status { .. })) >= 2
    })?;

    framework.start_provider()?;
    framework.wait_until("both items open again", || {
        consumer.item_state(first) == Some(ItemState::Open)
            && consumer.item_state(second) == Some(ItemState::Open)
    })?;
    validate_recovery(&client.observed(), first)?;
    validate_recovery(&client.observed(), second)?;
    Ok(())
}

#[test_log::test]
fn single_buffer_pool_blocks_instead_of_dropping() -> Result<()> {
    const PER_THREAD: u32 = 25;

    let framework = TestFramework::new(TestConfig::default())?;
    let consumer = Arc::new(framework.consumer()?);
    let client = Arc::new(RecordingClient::new());
    let handle = consumer.register_client(ibm(), client.clone(), Closure::none())?;
    framework.wait_until("IBM.N refresh", || client.observed().len() == 1)?;

    consumer.modify_ioctl(IoctlCode::NumGuaranteedBuffers.code(), 1)?;
    consumer.modify_ioctl(IoctlCode::MaxNumBuffers.code(), 1)?;
    assert_eq!(consumer.channel_information()[0].buffers.max, 1);

    let posters: Vec<_> = (0..2u32)
        .map(|worker| {
            let consumer = Arc::clone(&consumer);
            thread::spawn(move || -> Result<(), OmmError> {
                for n in 0..PER_THREAD {
                    let post = PostMsg::new()
                        .post_id(worker * PER_THREAD + n + 1)
                        .solicit_ack(true)
                        .complete(true);
                    consumer.submit_post(handle, post)?;
                }
                Ok(())
            })
        })
        .collect();
    for poster in posters {
        poster.join().expect("poster panicked")?;
    }

    let total = (2 * PER_THREAD) as usize;
    framework.wait_until("every post at the provider", || framework.feed().posts() == total)?;
    framework.wait_until("every ack", || {
        client.count(|o| matches!(o, Observed::Ack { .. })) == total
    })?;
    let acked: HashSet<u32> = client
        .observed()
        .iter()
        .filter_map(|o| match o {
            Observed::Ack { id, .. } => Some(*id),
            _ => None,
        })
        .collect();
    assert_eq!(acked, (1..=2 * PER_THREAD).collect());
    Ok(())
}

#[test_log::test]
fn domain_type_above_255_is_rejected_before_the_wire() -> Result<()> {
    let framework = TestFramework::new(TestConfig::default())?;
    let _consumer = framework.consumer()?;

    let error: OmmError = ReqMsg::new()
        .domain_type(256)
        .map(|_| ())
        .expect_err("256 must be rejected")
        .into();
    assert_eq!(error.kind(), OmmErrorKind::UnsupportedDomainType);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(framework.feed().requests(), 0);
    Ok(())
}

#[test_log::test]
fn unregister_stops_callbacks_while_the_provider_keeps_publishing() -> Result<()> {
    let framework = TestFramework::new(TestConfig::default())?;
    let consumer = framework.consumer()?;
    let client = Arc::new(RecordingClient::new());
    let handle = consumer.register_client(ibm(), client.clone(), Closure::none())?;
    framework.wait_until("IBM.N refresh", || client.observed().len() == 1)?;
    let published = framework.feed().handle("IBM.N").context("provider saw no request")?;

    let provider = framework.provider()?;
    for seq in 1..=5 {
        provider.submit(item_update(seq, 1), published.raw())?;
    }
    consumer.unregister(handle)?;
    let seen = client.for_handle(handle).len();
    for seq in 6..=10 {
        let _ = provider.submit(item_update(seq, 1), published.raw());
    }

    framework.wait_until("close at the provider", || framework.feed().closes() == 1)?;
    thread::sleep(Duration::from_millis(100));
    assert_eq!(client.for_handle(handle).len(), seen);
    assert_eq!(
        consumer.unregister(handle).map_err(|e| e.kind()),
        Err(OmmErrorKind::InvalidHandle)
    );
    Ok(())
}
