//! Byte-encoding lookup table for ASCII encoded rays.
//!
//! Each byte of an ASCII encoded ray payload maps to exactly one directive:
//! an absolute level, a run-length digit, a two-sample delta, a ray
//! terminator, or an invalid byte. The mapping is fixed by the protocol and
//! is shared process-wide; decoding never copies or mutates it.

/// Directive encoded by a single payload byte of an ASCII ray.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RayCode {
    /// Absolute level value written at the current bin.
    Value(u8),
    /// Decimal digit extending a run-length count of the previous value.
    Digit(u8),
    /// Two consecutive samples as signed increments from the previous value.
    Delta(i8, i8),
    /// End of the ray (NUL, LF or CR).
    Terminate,
    /// Byte that is invalid inside a ray payload.
    Error,
}

const fn val(v: u8) -> RayCode {
    RayCode::Value(v)
}
const fn dig(d: u8) -> RayCode {
    RayCode::Digit(d)
}
const fn del(a: i8, b: i8) -> RayCode {
    RayCode::Delta(a, b)
}
const END: RayCode = RayCode::Terminate;
const NUL: RayCode = RayCode::Error;

/// The 256-entry translation table for ASCII ray payload bytes.
#[rustfmt::skip]
pub static LOOKUP: [RayCode; 256] = [
    END,        NUL,        NUL,        NUL,        NUL,        NUL,        NUL,        NUL,        // 00-07
    NUL,        NUL,        END,        NUL,        NUL,        END,        NUL,        NUL,        // 08-0f
    NUL,        NUL,        NUL,        NUL,        NUL,        NUL,        NUL,        NUL,        // 10-17
    NUL,        NUL,        NUL,        NUL,        NUL,        NUL,        NUL,        NUL,        // 18-1f
    NUL,        del(-3,-3), val(16),    NUL,        del(-3,3),  NUL,        del(3,3),   val(17),    // 20-27
    del(-3,2),  del(3,2),   val(18),    del(1,0),   val(19),    del(-1,0),  del(0,0),   del(-3,-2), // 28-2f
    dig(0),     dig(1),     dig(2),     dig(3),     dig(4),     dig(5),     dig(6),     dig(7),     // 30-37
    dig(8),     dig(9),     val(20),    val(21),    del(0,-1),  val(22),    del(0,1),   val(23),    // 38-3f
    del(3,-3),  val(0),     val(1),     val(2),     val(3),     val(4),     val(5),     val(6),     // 40-47
    val(7),     val(8),     val(9),     val(10),    val(11),    val(12),    val(13),    val(14),    // 48-4f
    val(15),    val(24),    val(25),    del(-1,2),  del(0,2),   del(1,2),   del(2,2),   del(-1,3),  // 50-57
    del(0,3),   del(1,3),   val(26),    del(-2,-3), del(3,-2),  del(2,-3),  val(27),    val(28),    // 58-5f
    NUL,        del(-1,-3), del(0,-3),  del(1,-3),  del(-2,-2), del(-1,-2), del(0,-2),  del(1,-2),  // 60-67
    del(2,-2),  del(-3,-1), del(-2,-1), del(-1,-1), del(1,-1),  del(2,-1),  del(3,-1),  del(-3,0),  // 68-6f
    del(-2,0),  del(2,0),   del(3,0),   del(-3,1),  del(-2,1),  del(-1,1),  del(1,1),   del(2,1),   // 70-77
    del(3,1),   del(-2,2),  val(29),    del(-2,3),  val(30),    del(2,3),   val(31),    NUL,        // 78-7f
    val(32),    val(33),    val(34),    val(35),    val(36),    val(37),    val(38),    val(39),    // 80-87
    val(40),    val(41),    val(42),    val(43),    val(44),    val(45),    val(46),    val(47),    // 88-8f
    val(48),    val(49),    val(50),    val(51),    val(52),    val(53),    val(54),    val(55),    // 90-97
    val(56),    val(57),    val(58),    val(59),    val(60),    val(61),    val(62),    val(63),    // 98-9f
    val(64),    val(65),    val(66),    val(67),    val(68),    val(69),    val(70),    val(71),    // a0-a7
    val(72),    val(73),    val(74),    val(75),    val(76),    val(77),    val(78),    val(79),    // a8-af
    val(80),    val(81),    val(82),    val(83),    val(84),    val(85),    val(86),    val(87),    // b0-b7
    val(88),    val(89),    val(90),    val(91),    val(92),    val(93),    val(94),    val(95),    // b8-bf
    val(96),    val(97),    val(98),    val(99),    val(100),   val(101),   val(102),   val(103),   // c0-c7
    val(104),   val(105),   val(106),   val(107),   val(108),   val(109),   val(110),   val(111),   // c8-cf
    val(112),   val(113),   val(114),   val(115),   val(116),   val(117),   val(118),   val(119),   // d0-d7
    val(120),   val(121),   val(122),   val(123),   val(124),   val(125),   val(126),   val(127),   // d8-df
    val(128),   val(129),   val(130),   val(131),   val(132),   val(133),   val(134),   val(135),   // e0-e7
    val(136),   val(137),   val(138),   val(139),   val(140),   val(141),   val(142),   val(143),   // e8-ef
    val(144),   val(145),   val(146),   val(147),   val(148),   val(149),   val(150),   val(151),   // f0-f7
    val(152),   val(153),   val(154),   val(155),   val(156),   val(157),   val(158),   val(159),   // f8-ff
];

/// Encode an absolute level as an ASCII ray payload byte.
///
/// This is the inverse of the [`RayCode::Value`] entries of [`LOOKUP`].
/// Levels 160 and above have no absolute encoding and return `None`.
pub fn level_byte(level: u8) -> Option<u8> {
    let byte = match level {
        0..=15 => b'A' + level,
        16 => b'"',
        17 => b'\'',
        18 => b'*',
        19 => b',',
        20 => b':',
        21 => b';',
        22 => b'=',
        23 => b'?',
        24 => b'Q',
        25 => b'R',
        26 => b'Z',
        27 => b'^',
        28 => b'_',
        29 => b'z',
        30 => b'|',
        31 => b'~',
        32..=159 => 0x80 + (level - 32),
        _ => return None,
    };
    Some(byte)
}
