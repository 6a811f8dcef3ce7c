//! 批量搬运测试：缓冲之间、流与向量化通道。
#![cfg(not(all(feature = "loom-model", any(loom, spark_loom))))]

use std::io::{self, IoSlice, Read, Write};

use spark_bytebuf::{
    BigEndian, BufferError, ByteBuf, DirectByteBuf, HeapByteBuf, LittleEndian, Transfer,
    unsafe_buf::UnsafeByteBuf,
};

fn direct_with(content: &[u8]) -> DirectByteBuf<BigEndian> {
    let mut buf = DirectByteBuf::allocate(content.len(), 64).expect("构造");
    buf.write_bytes(content).expect("写入");
    buf
}

/// 任何调用都视为测试失败的传输，用于验证零长度搬运不触碰传输。
struct Untouchable;

impl Read for Untouchable {
    fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
        panic!("零长度读取不应访问传输");
    }
}

impl Write for Untouchable {
    fn write(&mut self, _: &[u8]) -> io::Result<usize> {
        panic!("零长度写出不应访问传输");
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// 模拟已断开的套接字。
struct Disconnected(io::ErrorKind);

impl Read for Disconnected {
    fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
        Err(self.0.into())
    }
}

impl Write for Disconnected {
    fn write(&mut self, _: &[u8]) -> io::Result<usize> {
        Err(self.0.into())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// 每次最多接收 `limit` 字节的写端，模拟短写。
struct Throttled {
    limit: usize,
    sink: Vec<u8>,
}

impl Write for Throttled {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = buf.len().min(self.limit);
        self.sink.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        let first = bufs.iter().find(|b| !b.is_empty()).map_or(&[][..], |b| &**b);
        self.write(first)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn direct_to_direct_copies_between_regions() {
    let src = direct_with(&[1, 2, 3, 4, 5, 6]);
    let mut dst = DirectByteBuf::<LittleEndian>::allocate(8, 8).expect("构造");
    src.get_bytes_to_buf(1, &mut dst, 2, 4).expect("搬运");
    let mut out = [0u8; 8];
    dst.get_slice(0, &mut out).expect("读取");
    assert_eq!(out, [0, 0, 2, 3, 4, 5, 0, 0]);

    let mut back = DirectByteBuf::<BigEndian>::allocate(4, 4).expect("构造");
    back.set_bytes_from_buf(0, &dst, 2, 4).expect("反向搬运");
    assert_eq!(back.get_i32(0).expect("读取"), 0x0203_0405);
}

#[test]
fn heap_and_direct_exchange_through_array() {
    let src = direct_with(&[9, 8, 7]);
    let mut heap = HeapByteBuf::<BigEndian>::new(4, 4).expect("构造");
    src.get_bytes_to_buf(0, &mut heap, 1, 3).expect("原生到堆");
    assert_eq!(heap.get_i32(0).expect("读取"), 0x0009_0807);

    let mut direct = DirectByteBuf::<BigEndian>::allocate(4, 4).expect("构造");
    direct.set_bytes_from_buf(0, &heap, 0, 4).expect("堆到原生");
    assert_eq!(direct.get_i32(0).expect("读取"), 0x0009_0807);

    let mut other_heap = HeapByteBuf::<BigEndian>::new(4, 4).expect("构造");
    heap.get_bytes_to_buf(0, &mut other_heap, 0, 4).expect("堆到堆");
    assert_eq!(other_heap.get_i32(0).expect("读取"), 0x0009_0807);
}

#[test]
fn transfer_between_aliases_handles_overlap() {
    let buf = direct_with(&[0, 1, 2, 3, 4, 5, 6, 7]);
    let mut dup = buf.duplicate();
    buf.get_bytes_to_buf(0, dup.as_mut(), 2, 6).expect("重叠搬运");
    let mut out = [0u8; 8];
    buf.get_slice(0, &mut out).expect("读取");
    assert_eq!(out, [0, 1, 0, 1, 2, 3, 4, 5]);

    let heap = HeapByteBuf::<BigEndian>::from_slice(&[0, 1, 2, 3, 4, 5, 6, 7]);
    let mut heap_dup = heap.duplicate();
    heap_dup.set_bytes_from_buf(0, &heap, 2, 6).expect("重叠搬运");
    let mut out = [0u8; 8];
    heap.get_slice(0, &mut out).expect("读取");
    assert_eq!(out, [2, 3, 4, 5, 6, 7, 6, 7]);
}

#[test]
fn transfer_checks_both_sides() {
    let src = direct_with(&[1, 2, 3, 4]);
    let mut dst = DirectByteBuf::<BigEndian>::allocate(2, 2).expect("构造");
    assert!(matches!(
        src.get_bytes_to_buf(0, &mut dst, 0, 4),
        Err(BufferError::IndexOutOfBounds { capacity: 2, .. })
    ));
    assert!(src.get_bytes_to_buf(2, &mut dst, 0, 4).is_err());
    assert_eq!(dst.get_u8(0).expect("读取"), 0);

    let mut released = DirectByteBuf::<BigEndian>::allocate(4, 4).expect("构造");
    released.release().expect("释放");
    assert!(matches!(
        src.get_bytes_to_buf(0, &mut released, 0, 4),
        Err(BufferError::Released)
    ));
    src.get_bytes_to_buf(0, &mut released, 0, 0)
        .expect("零长度搬运是空操作");
}

#[test]
fn peer_storage_stays_pinned_while_resized_elsewhere() {
    let mut shared = DirectByteBuf::<BigEndian>::allocate(16, 256).expect("构造");
    shared.write_bytes(&[3; 16]).expect("写入");
    let peer = shared.duplicate_typed();

    std::thread::scope(|scope| {
        let copier = scope.spawn(move || {
            let mut local = HeapByteBuf::<BigEndian>::new(8, 8).expect("构造");
            loop {
                match local.set_bytes_from_buf(0, &peer, 0, 8) {
                    Ok(()) => assert_eq!(local.get_i64(0).expect("读取"), 0x0303_0303_0303_0303),
                    Err(BufferError::Released) => return,
                    Err(err) => panic!("意外错误: {err}"),
                }
            }
        });
        for step in 0..256 {
            shared.set_capacity(16 * (1 + step % 8)).expect("调整容量");
        }
        assert!(shared.release().expect("释放"));
        copier.join().expect("搬运线程正常结束");
    });
}

#[test]
fn stream_transfers_move_bytes() {
    let mut buf = direct_with(b"hello");
    let mut out = Vec::new();
    buf.get_bytes_to_writer(1, &mut out, 3).expect("写出");
    assert_eq!(out, b"ell");

    buf.read_to(&mut out, 5).expect("顺序写出");
    assert_eq!(out, b"ellhello");
    assert!(!buf.is_readable());

    let mut input: &[u8] = b"xy";
    let transfer = buf.set_bytes_from_reader(0, &mut input, 4).expect("读入");
    assert_eq!(transfer, Transfer::Bytes(2), "短读返回实际字节数");
    assert_eq!(buf.get_u8(1).expect("读取"), b'y');

    let transfer = buf
        .set_bytes_from_reader(0, &mut input, 4)
        .expect("输入已耗尽");
    assert!(transfer.is_end_of_stream());
}

#[test]
fn write_from_advances_by_bytes_read() {
    let mut buf = HeapByteBuf::<BigEndian>::new(0, 64).expect("构造");
    let mut input: &[u8] = &[1, 2, 3];
    let transfer = buf.write_from(&mut input, 8).expect("读入");
    assert_eq!(transfer.bytes(), 3);
    assert_eq!(buf.writer_index(), 3);
    assert_eq!(buf.get_u24(0).expect("读取"), 0x010203);

    let transfer = buf.write_from(&mut input, 8).expect("流结束");
    assert_eq!(transfer, Transfer::EndOfStream);
    assert_eq!(buf.writer_index(), 3);
}

#[test]
fn zero_length_transfers_never_touch_transport() {
    let mut buf = direct_with(&[1, 2, 3]);
    buf.get_bytes_to_writer(0, &mut Untouchable, 0).expect("空操作");
    assert_eq!(
        buf.set_bytes_from_reader(0, &mut Untouchable, 0).expect("空操作"),
        Transfer::Bytes(0)
    );
    assert_eq!(
        buf.get_bytes_to_channel(0, &mut Untouchable, 0).expect("空操作"),
        Transfer::Bytes(0)
    );
    assert_eq!(
        buf.set_bytes_from_channel(0, &mut Untouchable, 0).expect("空操作"),
        Transfer::Bytes(0)
    );
}

#[test]
fn channel_transfers_report_short_writes_and_disconnects() {
    let mut buf = direct_with(&[1, 2, 3, 4, 5, 6]);
    let mut throttled = Throttled {
        limit: 4,
        sink: Vec::new(),
    };
    let transfer = buf
        .get_bytes_to_channel(0, &mut throttled, 6)
        .expect("向量化写");
    assert_eq!(transfer, Transfer::Bytes(4));
    assert_eq!(throttled.sink, [1, 2, 3, 4]);

    let transfer = buf
        .get_bytes_to_channel(0, &mut Disconnected(io::ErrorKind::BrokenPipe), 6)
        .expect("断开不是错误");
    assert_eq!(transfer, Transfer::EndOfStream);

    let transfer = buf
        .set_bytes_from_channel(0, &mut Disconnected(io::ErrorKind::NotConnected), 6)
        .expect("断开不是错误");
    assert_eq!(transfer, Transfer::EndOfStream);

    let err = buf
        .set_bytes_from_channel(0, &mut Disconnected(io::ErrorKind::PermissionDenied), 6)
        .expect_err("其它 I/O 错误向上传播");
    assert!(matches!(err, BufferError::Io(_)));

    let mut input: &[u8] = &[9, 9];
    let transfer = buf
        .set_bytes_from_channel(4, &mut input, 2)
        .expect("向量化读");
    assert_eq!(transfer, Transfer::Bytes(2));
    assert_eq!(buf.get_i16(4).expect("读取"), 0x0909);
}

#[test]
fn write_buf_moves_readable_bytes_between_kinds() {
    let mut src = HeapByteBuf::<BigEndian>::from_slice(&[1, 2, 3, 4, 5]);
    src.skip_bytes(1).expect("消费");
    let mut dst = DirectByteBuf::<BigEndian>::allocate(0, 64).expect("构造");
    dst.write_buf(&mut src, 3).expect("搬运");
    assert_eq!(src.reader_index(), 4);
    assert_eq!(dst.writer_index(), 3);
    assert_eq!(dst.get_u24(0).expect("读取"), 0x020304);
    assert!(matches!(
        dst.write_buf(&mut src, 2),
        Err(BufferError::ReadableUnderflow {
            requested: 2,
            readable: 1
        })
    ));
}

#[test]
fn views_expose_live_window_for_vectored_io() {
    let mut buf = direct_with(&[1, 2, 3, 4]);
    // SAFETY: 视图在下一次访问缓冲前被丢弃。
    let views = unsafe { buf.read_views(1, 3) }.expect("只读视图");
    assert_eq!(views.len(), 1);
    assert_eq!(&*views[0], &[2, 3, 4]);
    drop(views);

    // SAFETY: 同上。
    let view = unsafe { buf.write_view(0, 2) }.expect("可写视图");
    view.copy_from_slice(&[7, 7]);
    assert_eq!(buf.get_i16(0).expect("写入可见"), 0x0707);

    // SAFETY: 越界请求在合成视图前失败。
    assert!(unsafe { buf.read_view(2, 3) }.is_err());
}
