/*! Codepoints are used by RFC 1951 to encode distances and lengths. Each codepoint
consists of a value, encoded using the appropriate Huffman Tree, possibly followed
by a number of literal bits that are added to the codepoint's base value.

The decode tables in `huff_tree` fold these into their entries, so decoding a
length or distance is a single table lookup followed by an extra-bits read. */

/* The code table from RFC 1951 is reproduced below to avoid extra ALT-TABs

             Extra               Extra               Extra
        Code Bits Length(s) Code Bits Lengths   Code Bits Length(s)
        ---- ---- ------     ---- ---- -------   ---- ---- -------
         257   0     3       267   1   15,16     277   4   67-82
         258   0     4       268   1   17,18     278   4   83-98
         259   0     5       269   2   19-22     279   4   99-114
         260   0     6       270   2   23-26     280   4  115-130
         261   0     7       271   2   27-30     281   5  131-162
         262   0     8       272   2   31-34     282   5  163-194
         263   0     9       273   3   35-42     283   5  195-226
         264   0    10       274   3   43-50     284   5  227-257
         265   1  11,12      275   3   51-58     285   0    258
         266   1  13,14      276   3   59-66

              Extra           Extra               Extra
         Code Bits Dist  Code Bits   Dist     Code Bits Distance
         ---- ---- ----  ---- ----  ------    ---- ---- --------
           0   0    1     10   4     33-48    20    9   1025-1536
           1   0    2     11   4     49-64    21    9   1537-2048
           2   0    3     12   5     65-96    22   10   2049-3072
           3   0    4     13   5     97-128   23   10   3073-4096
           4   1   5,6    14   6    129-192   24   11   4097-6144
           5   1   7,8    15   6    193-256   25   11   6145-8192
           6   2   9-12   16   7    257-384   26   12  8193-12288
           7   2  13-16   17   7    385-512   27   12 12289-16384
           8   3  17-24   18   8    513-768   28   13 16385-24576
           9   3  25-32   19   8   769-1024   29   13 24577-32768
*/

pub const MIN_LENGTH_CODE: u16 = 257;
pub const MAX_LENGTH_CODE: u16 = 285;
pub const EOF_CODE: u16 = 256;
pub const MAX_DIST_CODE: u16 = 29;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Codepoint {
  code: u16,
  nbits: u8,
  lo: u16,
}

impl Codepoint {
  pub const fn new(code: u16, nbits: u8, lo: u16) -> Self {
    Self { code, nbits, lo }
  }

  pub fn code(&self) -> u16 {
    self.code
  }

  /// Number of extra bits following the Huffman-coded symbol.
  pub fn extra_bits(&self) -> u8 {
    self.nbits
  }

  /// Smallest value this codepoint can represent.
  pub fn base(&self) -> u16 {
    self.lo
  }
}

pub const LENGTH_CODEPOINTS: [Codepoint; 29] = [
  Codepoint::new(257, 0, 3),
  Codepoint::new(258, 0, 4),
  Codepoint::new(259, 0, 5),
  Codepoint::new(260, 0, 6),
  Codepoint::new(261, 0, 7),
  Codepoint::new(262, 0, 8),
  Codepoint::new(263, 0, 9),
  Codepoint::new(264, 0, 10),
  Codepoint::new(265, 1, 11),
  Codepoint::new(266, 1, 13),
  Codepoint::new(267, 1, 15),
  Codepoint::new(268, 1, 17),
  Codepoint::new(269, 2, 19),
  Codepoint::new(270, 2, 23),
  Codepoint::new(271, 2, 27),
  Codepoint::new(272, 2, 31),
  Codepoint::new(273, 3, 35),
  Codepoint::new(274, 3, 43),
  Codepoint::new(275, 3, 51),
  Codepoint::new(276, 3, 59),
  Codepoint::new(277, 4, 67),
  Codepoint::new(278, 4, 83),
  Codepoint::new(279, 4, 99),
  Codepoint::new(280, 4, 115),
  Codepoint::new(281, 5, 131),
  Codepoint::new(282, 5, 163),
  Codepoint::new(283, 5, 195),
  Codepoint::new(284, 5, 227),
  Codepoint::new(285, 0, 258),
];

pub const DIST_CODEPOINTS: [Codepoint; 30] = [
  Codepoint::new(0, 0, 1),
  Codepoint::new(1, 0, 2),
  Codepoint::new(2, 0, 3),
  Codepoint::new(3, 0, 4),
  Codepoint::new(4, 1, 5),
  Codepoint::new(5, 1, 7),
  Codepoint::new(6, 2, 9),
  Codepoint::new(7, 2, 13),
  Codepoint::new(8, 3, 17),
  Codepoint::new(9, 3, 25),
  Codepoint::new(10, 4, 33),
  Codepoint::new(11, 4, 49),
  Codepoint::new(12, 5, 65),
  Codepoint::new(13, 5, 97),
  Codepoint::new(14, 6, 129),
  Codepoint::new(15, 6, 193),
  Codepoint::new(16, 7, 257),
  Codepoint::new(17, 7, 385),
  Codepoint::new(18, 8, 513),
  Codepoint::new(19, 8, 769),
  Codepoint::new(20, 9, 1025),
  Codepoint::new(21, 9, 1537),
  Codepoint::new(22, 10, 2049),
  Codepoint::new(23, 10, 3073),
  Codepoint::new(24, 11, 4097),
  Codepoint::new(25, 11, 6145),
  Codepoint::new(26, 12, 8193),
  Codepoint::new(27, 12, 12289),
  Codepoint::new(28, 13, 16385),
  Codepoint::new(29, 13, 24577),
];
