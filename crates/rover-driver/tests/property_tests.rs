//! 帧缓冲、命令映射和运动状态机的属性测试

use proptest::prelude::*;
use rover_driver::{CommandMapper, FrameBuffer, MotionConfig, MotionController, TriggerTable};
use rover_hal::mock::MockActuator;
use rover_hal::{Frame, FrameEncoding};
use rover_protocol::Command;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn frame(seq: u64) -> Frame {
    Frame::new(1, 1, FrameEncoding::Rgb8, vec![0u8; 3]).with_sequence(seq)
}

fn command_strategy() -> impl Strategy<Value = Command> {
    prop::sample::select(vec![
        Command::Forward,
        Command::Back,
        Command::Left,
        Command::Right,
        Command::Stop,
        Command::Unknown,
    ])
}

proptest! {
    /// 任意插入序列后：长度不超过容量，最新帧总是最后插入的那一帧
    #[test]
    fn buffer_keeps_latest_within_capacity(capacity in 1usize..=2, count in 1u64..64) {
        let buffer = FrameBuffer::new(capacity).unwrap();
        for seq in 1..=count {
            buffer.push(frame(seq));
            prop_assert!(buffer.len() <= capacity);
            prop_assert_eq!(buffer.latest().unwrap().sequence, seq);
        }
        let stats = buffer.stats();
        prop_assert_eq!(stats.pushed, count);
        prop_assert_eq!(stats.evicted, count.saturating_sub(capacity as u64));
        prop_assert_eq!(buffer.pop_latest(Duration::ZERO).unwrap().sequence, count);
    }

    /// 映射是纯函数：同一输入总是得到同一命令，且与顺序无关
    #[test]
    fn mapper_is_deterministic_and_order_free(
        mut classes in prop::collection::vec(0u32..80, 0..12),
    ) {
        let mapper = CommandMapper::default();
        let first = mapper.map_classes(&classes);
        prop_assert_eq!(mapper.map_classes(&classes), first);
        classes.reverse();
        prop_assert_eq!(mapper.map_classes(&classes), first);

        let expected = if classes.contains(&0) {
            Command::Forward
        } else if classes.contains(&2) {
            Command::Left
        } else {
            Command::Stop
        };
        prop_assert_eq!(first, expected);
    }

    /// 与前一条相同的命令不产生任何执行器写入
    #[test]
    fn repeated_commands_are_idempotent(commands in prop::collection::vec(command_strategy(), 1..24)) {
        let observer = MockActuator::new();
        let motion = MotionController::new(observer.clone(), MotionConfig::default()).unwrap();

        let mut previous = motion.state();
        for command in commands {
            let before = observer.calls().len();
            motion.apply(command).unwrap();
            let state = motion.state();
            if state == previous {
                prop_assert_eq!(observer.calls().len(), before);
            } else {
                prop_assert!(observer.calls().len() > before);
            }
            previous = state;
        }
    }
}

#[test]
fn test_empty_trigger_table_always_stops() {
    let mapper = CommandMapper::new(TriggerTable::empty(), Default::default());
    assert_eq!(mapper.map_classes(&[0, 2, 67]), Command::Stop);
}

#[test]
fn test_concurrent_readers_share_latest_frame() {
    let buffer = Arc::new(FrameBuffer::new(1).unwrap());

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let buffer = buffer.clone();
            thread::spawn(move || buffer.pop_latest(Duration::from_secs(2)).map(|f| f.sequence))
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    buffer.push(frame(42));

    for reader in readers {
        assert_eq!(reader.join().unwrap(), Some(42));
    }
    // 读取不移除
    assert_eq!(buffer.len(), 1);
}

#[test]
fn test_producer_never_blocks_on_slow_consumer() {
    let buffer = Arc::new(FrameBuffer::new(2).unwrap());
    let producer = {
        let buffer = buffer.clone();
        thread::spawn(move || {
            for seq in 1..=10_000 {
                buffer.push(frame(seq));
            }
        })
    };
    producer.join().unwrap();

    let stats = buffer.stats();
    assert_eq!(stats.pushed, 10_000);
    assert_eq!(stats.len, 2);
    assert_eq!(buffer.latest().unwrap().sequence, 10_000);

    let (seen, latest) = buffer.pop_newer(0, Duration::ZERO).unwrap();
    assert_eq!((seen, latest.sequence), (10_000, 10_000));
    assert!(buffer.pop_newer(seen, Duration::from_millis(10)).is_none());
}
