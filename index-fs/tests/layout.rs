mod common;

use common::{MemDisk, SharedFreeMap};
use index_fs::layout::{DirectNode, IndirectNode, MAX_LENGTH, NODE_POINTERS};
use index_fs::{Error, InodeData, SectorCache, SectorId, NO_SECTOR, SECTOR_SIZE};

const SECTORS: usize = 40_000;
const CAPACITY: usize = 64;

/// 直接节点的栖身扇区，setup里保留给调用者
const NODE_SECTOR: SectorId = SectorId::new(0);

fn setup(sectors: usize) -> (SectorCache, SharedFreeMap) {
    let disk = MemDisk::new(sectors);
    let cache = SectorCache::new(disk, CAPACITY, sectors);
    let free_map = SharedFreeMap::new(sectors, 1);
    (cache, free_map)
}

#[test]
fn direct_node_round_trip() {
    let mut node = DirectNode::new();
    node.sectors[0] = 7;
    node.sectors[NODE_POINTERS - 1] = 42;
    node.length = 123_456;
    node.indirect = 9;

    let mut buf = [0; SECTOR_SIZE];
    node.encode(&mut buf);
    let decoded = DirectNode::decode(&buf).unwrap();

    assert_eq!(node.sectors, decoded.sectors);
    assert_eq!(node.length, decoded.length);
    assert_eq!(node.indirect, decoded.indirect);
    assert_eq!(node.doubly_indirect, decoded.doubly_indirect);
}

#[test]
fn indirect_node_round_trip() {
    let mut node = IndirectNode::new();
    node.sectors[3] = 99;

    let mut buf = [0xff; SECTOR_SIZE];
    node.encode(&mut buf);
    let decoded = IndirectNode::decode(&buf).unwrap();

    assert_eq!(node.sectors, decoded.sectors);
    // 指针之后的字是编码补零出来的
    assert_eq!([0; 12], buf[SECTOR_SIZE - 12..]);
}

#[test]
fn decode_rejects_bad_magic() {
    let buf = [0; SECTOR_SIZE];
    assert_eq!(Err(Error::Corrupted), DirectNode::decode(&buf).map(|_| ()));
    assert_eq!(Err(Error::Corrupted), IndirectNode::decode(&buf).map(|_| ()));

    // 合法编码篡改魔数一个字节后同样拒收
    let mut buf = [0; SECTOR_SIZE];
    DirectNode::new().encode(&mut buf);
    buf[SECTOR_SIZE - 1] ^= 1;
    assert_eq!(Err(Error::Corrupted), DirectNode::decode(&buf).map(|_| ()));
}

#[test]
fn empty_mapping_resolves_nothing() {
    let (cache, mut free_map) = setup(64);
    let mut guard = cache.lock();

    let data = InodeData::create(&mut guard, &mut free_map, NODE_SECTOR, 0).unwrap();
    assert_eq!(0, data.length());
    assert_eq!(None, data.byte_to_sector(0));
}

#[test]
fn byte_to_sector_walks_all_three_tiers() {
    let (cache, mut free_map) = setup(SECTORS);
    let mut guard = cache.lock();

    // 落进二级间接第2个子节点的长度
    let length = ((2 * NODE_POINTERS + NODE_POINTERS + 3) * SECTOR_SIZE) as u32;
    let data = InodeData::create(&mut guard, &mut free_map, NODE_SECTOR, length).unwrap();

    let offsets = [
        0,
        (NODE_POINTERS - 1) * SECTOR_SIZE,
        NODE_POINTERS * SECTOR_SIZE,
        (2 * NODE_POINTERS - 1) * SECTOR_SIZE,
        2 * NODE_POINTERS * SECTOR_SIZE,
        (2 * NODE_POINTERS + NODE_POINTERS + 2) * SECTOR_SIZE,
        length as usize - 1,
    ];
    let mut resolved = Vec::new();
    for offset in offsets {
        resolved.push(data.byte_to_sector(offset).unwrap());
    }

    // 不同逻辑块各有其扇区
    let mut blocks: Vec<_> = offsets.iter().map(|offset| offset / SECTOR_SIZE).collect();
    blocks.dedup();
    let mut sectors = resolved.clone();
    sectors.sort();
    sectors.dedup();
    assert_eq!(blocks.len(), sectors.len());

    // 长度处以及之后一律落空
    assert_eq!(None, data.byte_to_sector(length as usize));
    assert_eq!(None, data.byte_to_sector(length as usize + SECTOR_SIZE));

    // 翻译是纯函数，重复询问答案一致
    for (offset, sector) in offsets.into_iter().zip(resolved) {
        assert_eq!(Some(sector), data.byte_to_sector(offset));
    }
}

#[test]
fn create_open_round_trip() {
    let (cache, mut free_map) = setup(SECTORS);
    let mut guard = cache.lock();

    let length = ((2 * NODE_POINTERS + 5) * SECTOR_SIZE) as u32;
    let created = InodeData::create(&mut guard, &mut free_map, NODE_SECTOR, length).unwrap();
    let opened = InodeData::open(&mut guard, NODE_SECTOR).unwrap();

    assert_eq!(created.length(), opened.length());
    for offset in (0..length as usize).step_by(SECTOR_SIZE) {
        assert_eq!(created.byte_to_sector(offset), opened.byte_to_sector(offset));
    }
}

#[test]
fn extend_preserves_existing_mapping() {
    let (cache, mut free_map) = setup(SECTORS);
    let mut guard = cache.lock();

    let initial = (3 * SECTOR_SIZE) as u32;
    let mut data = InodeData::create(&mut guard, &mut free_map, NODE_SECTOR, initial).unwrap();
    let before: Vec<_> = (0..initial as usize)
        .step_by(SECTOR_SIZE)
        .map(|offset| data.byte_to_sector(offset).unwrap())
        .collect();

    // 跨过两个层级边界的扩展
    let target = ((2 * NODE_POINTERS + 10) * SECTOR_SIZE) as u32;
    data.extend(&mut guard, &mut free_map, target - initial).unwrap();

    assert_eq!(target, data.length());
    for (offset, sector) in (0..initial as usize).step_by(SECTOR_SIZE).zip(before) {
        assert_eq!(Some(sector), data.byte_to_sector(offset));
    }
    assert!(data.byte_to_sector(target as usize - 1).is_some());
}

#[test]
fn extend_zero_is_noop() {
    let (cache, mut free_map) = setup(64);
    let mut guard = cache.lock();

    let mut data = InodeData::create(&mut guard, &mut free_map, NODE_SECTOR, 512).unwrap();
    let free_before = free_map.free_count();
    data.extend(&mut guard, &mut free_map, 0).unwrap();
    assert_eq!(512, data.length());
    assert_eq!(free_before, free_map.free_count());
}

#[test]
fn oversized_mapping_rejected() {
    let (cache, mut free_map) = setup(64);
    let mut guard = cache.lock();

    let mut data = InodeData::create(&mut guard, &mut free_map, NODE_SECTOR, 0).unwrap();
    assert_eq!(
        Err(Error::TooLarge),
        data.extend(&mut guard, &mut free_map, MAX_LENGTH + 1)
    );
    // u32溢出同样视作超限
    data.extend(&mut guard, &mut free_map, 512).unwrap();
    assert_eq!(
        Err(Error::TooLarge),
        data.extend(&mut guard, &mut free_map, u32::MAX)
    );
    assert_eq!(512, data.length());
}

#[test]
fn failed_extend_rolls_back_allocations() {
    // 小盘：保留节点扇区后只剩15个可分配
    let (cache, mut free_map) = setup(16);
    let mut guard = cache.lock();

    let mut data = InodeData::create(&mut guard, &mut free_map, NODE_SECTOR, 2048).unwrap();
    let free_before = free_map.free_count();

    // 需要的扇区远多于剩余，分配中途必然失败
    let huge = (NODE_POINTERS * SECTOR_SIZE) as u32;
    assert_eq!(
        Err(Error::DiskFull),
        data.extend(&mut guard, &mut free_map, huge)
    );

    assert_eq!(2048, data.length());
    assert_eq!(free_before, free_map.free_count());
    assert!(data.byte_to_sector(2047).is_some());
}

#[test]
fn release_returns_every_sector() {
    let (cache, mut free_map) = setup(SECTORS);
    let mut guard = cache.lock();
    let free_before = free_map.free_count();

    let length = ((2 * NODE_POINTERS + NODE_POINTERS + 7) * SECTOR_SIZE) as u32;
    let data = InodeData::create(&mut guard, &mut free_map, NODE_SECTOR, length).unwrap();
    assert!(free_map.free_count() < free_before);

    data.release(&mut free_map);
    assert_eq!(free_before, free_map.free_count());
}

#[test]
fn open_rejects_dangling_pointer() {
    let (cache, _free_map) = setup(64);
    let mut guard = cache.lock();

    // 长度声称用到一级间接，指针却是空值
    let mut node = DirectNode::new();
    node.length = ((NODE_POINTERS + 1) * SECTOR_SIZE) as u32;
    node.sectors.fill(1);
    assert_eq!(NO_SECTOR, node.indirect);
    node.encode(guard.get_buffer(NODE_SECTOR));
    guard.write(NODE_SECTOR);

    assert_eq!(
        Err(Error::Corrupted),
        InodeData::open(&mut guard, NODE_SECTOR).map(|_| ())
    );
}
