//! Turns the poster form into the art-direction prompt sent to the image model.
//!
//! The output is a pure function of [`PosterData`]; the portrait bytes are never read.

use crate::poster::types::{PosterData, PosterStyle};

const NAM_VUI_STAGE_SETTING: &str = "- Sân khấu rèm nhung ĐỎ ĐÔ (Deep Red Velvet) xếp nếp cổ điển và sang trọng.
- 2 đèn Spotlight ĐỎ rực rỡ chiếu chéo từ 2 góc trên cùng xuống, tạo hiệu ứng tia sáng hình nón rõ rệt.
- Sàn đá marble đỏ đen bóng loáng (Red & Black Polished Floor) phản chiếu chân thực bóng của nghệ sĩ.";

const REDESIGN_DIRECTIVE: &str = "CHẾ ĐỘ NÂNG CẤP CHÂN DUNG (AI REDESIGN):
- PHONG THÁI: Đĩnh đạc, sang trọng, phong thái nghệ sĩ chuyên nghiệp, phù hợp hoàn hảo với lứa tuổi trung niên.
- TRANG PHỤC: Thay thế bằng bộ đồ biểu diễn cao cấp (ví dụ: áo dài dạ hội sequin lộng lẫy, váy dạ yến sang trọng hoặc bộ suit/tuxedo lịch lãm).
- TƯ THẾ: Đứng thẳng, phong thái tự tin, có thể cầm micro vintage có chân đứng (stand microphone).
- YÊU CẦU BẮT BUỘC: GIỮ NGUYÊN 100% CHI TIẾT KHUÔN MẶT gốc của người trong ảnh.";

const FAITHFUL_DIRECTIVE: &str = "CHẾ ĐỘ GIỮ NGUYÊN GỐC (FAITHFUL ENHANCE):
- GIỮ NGUYÊN trang phục và tư thế của nghệ sĩ.
- HẬU KỲ: Tách nền cực kỳ sắc nét (hair-level isolation), nâng cấp độ phân giải 4K, hiệu chỉnh ánh sáng đỏ spotlight hòa quyện vào chủ thể.";

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.trim().is_empty())
}

/// NAM_VUI keeps the red-velvet stage; the other styles describe their own stage.
fn stage_setting(style: PosterStyle) -> String {
    match style {
        PosterStyle::NamVui => NAM_VUI_STAGE_SETTING.to_string(),
        other => format!("- {}", other.mapping().description),
    }
}

/// How the artist's name should be lettered.
pub fn singer_font_instruction(data: &PosterData) -> String {
    if let Some(font) = non_empty(data.font_preference.as_deref()) {
        return format!(
            "RIÊNG TÊN CA SĨ \"{}\": Thiết kế theo kiểu {}.",
            data.artist,
            font.trim()
        );
    }

    match data.style {
        PosterStyle::NamVui => format!(
            "TÊN CHÍNH \"{}\": Phải sử dụng font Sans-serif Extra Bold, kích thước CỰC LỚN, màu GRADIENT từ HỒNG sang VÀNG rực rỡ, có hiệu ứng đổ bóng sâu (deep shadow) để tách biệt khỏi phông nền.",
            data.artist
        ),
        other => other.mapping().font_description.to_string(),
    }
}

/// Footer with date and time. Empty when neither is set.
pub fn time_footer_instruction(data: &PosterData) -> String {
    let date = non_empty(data.date.as_deref());
    let time = non_empty(data.time.as_deref());
    if date.is_none() && time.is_none() {
        return String::new();
    }

    format!(
        "
- PHẦN THÔNG TIN THỜI GIAN (FOOTER):
  + Vị trí: Ở sát cạnh dưới của poster, nằm trên mặt sàn đá đỏ phản chiếu.
  + Phong cách: Chữ màu VÀNG CHANH (Vibrant Yellow), font Sans-serif đậm, có độ phát sáng nhẹ.
  + Nội dung: \"{}  |  LIVE MUSIC  |  {}\" (Ngăn cách bởi các vạch dọc trắng mỏng).",
        date.unwrap_or_default(),
        time.unwrap_or_default()
    )
}

fn portrait_directive(data: &PosterData) -> &'static str {
    if data.ai_redesign {
        REDESIGN_DIRECTIVE
    } else {
        FAITHFUL_DIRECTIVE
    }
}

pub fn build_poster_prompt(data: &PosterData) -> String {
    let artist = data.artist.as_str();
    format!(
        "BẠN LÀ GIÁM ĐỐC NGHỆ THUẬT CỦA \"NAM VUI DESIGNER\".
NHIỆM VỤ: TẠO POSTER CA NHẠC 4K ĐẲNG CẤP SHOWBIZ, TUÂN THỦ NGHIÊM NGẶT BỐ CỤC VÀ PHỐI MÀU SAU:

1. BỐI CẢNH (STAGE SETTING):
{stage}

2. QUY TẮC VĂN BẢN VÀ PHỐI MÀU (TEXT & COLORS):
- DÒNG CÂU LẠC BỘ (TOP): \"{club}\".
  + Màu sắc: VÀNG GOLD sang trọng (Premium Golden), font Sans-serif thanh mảnh, căn giữa.
- DÒNG SỰ KIỆN: \"{event}\".
  + Màu sắc: TRẮNG ÁNH BẠC (Glowing Silver White), In hoa, Bold, căn giữa, nằm ngay dưới CLB.

- KHU VỰC TRUNG TÂM (NGHỆ SĨ):
  + CHỮ \"CA SĨ\": (Màu TRẮNG, font Sans-serif, kích thước NHỎ). VỊ TRÍ: Phải đặt ngay phía trên (ở vị trí đỉnh) của tên chính \"{artist}\". Đây là một nhãn phụ nhỏ.
  + TÊN CHÍNH: \"{artist}\" (Kích thước CỰC LỚN, nổi bật nhất poster).
  + KIỂU CHỮ TÊN CHÍNH: {singer_font}
  + SỐ BÁO DANH: \"{seat}\" (Chữ TRẮNG, font Sans-serif, cỡ vừa). VỊ TRÍ: Nằm bên phải của tên ca sĩ.

3. QUY TẮC NGĂN CHẶN LỖI TRÌNH BÀY:
- CẤM: Tuyệt đối không lặp lại tên ca sĩ \"{artist}\" và SBD ở bất kỳ nơi nào khác trên poster. Chỉ xuất hiện 1 lần duy nhất tại trung tâm.
- Đảm bảo chữ \"CA SĨ\" nhỏ luôn nằm phía trên tên nghệ sĩ.
{footer}
- GÓC PHẢI DƯỚI: \"By NAM VUI DESIGNER\" (Chữ trắng nhỏ).

4. KỸ THUẬT:
{directive}
- Chất lượng: 4K Ultra HD, Tỉ lệ 3:4.
- Ánh sáng: Sắc nét, rực rỡ, mang không khí đêm nhạc biểu diễn trực tiếp.
- Văn bản Tiếng Việt phải có dấu đầy đủ và chính xác 100%.",
        stage = stage_setting(data.style),
        club = data.club,
        event = data.event_line(),
        artist = artist,
        singer_font = singer_font_instruction(data),
        seat = data.seat_number,
        footer = time_footer_instruction(data),
        directive = portrait_directive(data),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poster::types::PortraitImage;

    fn sample() -> PosterData {
        PosterData {
            club: "CLB Hoa Sen".to_string(),
            event: "Đêm Nhạc Mùa Thu".to_string(),
            artist: "Minh Tâm".to_string(),
            seat_number: "SBD 101".to_string(),
            date: Some("CN 12-01".to_string()),
            time: Some("8:00 PM".to_string()),
            ..PosterData::default()
        }
    }

    #[test]
    fn same_form_yields_identical_prompt() {
        let data = sample();
        assert_eq!(build_poster_prompt(&data), build_poster_prompt(&data.clone()));
    }

    #[test]
    fn portrait_bytes_do_not_affect_prompt() {
        let without = sample();
        let with = PosterData {
            portrait: Some(PortraitImage::from_bytes(vec![9, 9, 9])),
            ..sample()
        };
        assert_eq!(build_poster_prompt(&without), build_poster_prompt(&with));
    }

    #[test]
    fn form_fields_appear_in_prompt() {
        let prompt = build_poster_prompt(&sample());
        assert!(prompt.contains("DÒNG CÂU LẠC BỘ (TOP): \"CLB Hoa Sen\""));
        assert!(prompt.contains("DÒNG SỰ KIỆN: \"Đêm Nhạc Mùa Thu\""));
        assert!(prompt.contains("TÊN CHÍNH: \"Minh Tâm\""));
        assert!(prompt.contains("SỐ BÁO DANH: \"SBD 101\""));
        assert!(prompt.contains("\"CN 12-01  |  LIVE MUSIC  |  8:00 PM\""));
        assert!(prompt.contains("By NAM VUI DESIGNER"));
    }

    #[test]
    fn footer_is_omitted_without_date_or_time() {
        let data = PosterData {
            date: None,
            time: Some("  ".to_string()),
            ..sample()
        };
        let prompt = build_poster_prompt(&data);
        assert!(!prompt.contains("FOOTER"));
        assert!(!prompt.contains("LIVE MUSIC  |"));
    }

    #[test]
    fn footer_keeps_separators_when_only_time_is_set() {
        let data = PosterData {
            date: None,
            ..sample()
        };
        assert!(time_footer_instruction(&data).contains("\"  |  LIVE MUSIC  |  8:00 PM\""));
    }

    #[test]
    fn redesign_toggle_switches_directive() {
        let redesign = build_poster_prompt(&sample());
        assert!(redesign.contains("AI REDESIGN"));
        assert!(!redesign.contains("FAITHFUL ENHANCE"));

        let faithful = build_poster_prompt(&PosterData {
            ai_redesign: false,
            ..sample()
        });
        assert!(faithful.contains("FAITHFUL ENHANCE"));
        assert!(!faithful.contains("AI REDESIGN"));
    }

    #[test]
    fn nam_vui_defaults_to_gradient_lettering() {
        let instruction = singer_font_instruction(&sample());
        assert!(instruction.starts_with("TÊN CHÍNH \"Minh Tâm\""));
        assert!(instruction.contains("GRADIENT từ HỒNG sang VÀNG"));
    }

    #[test]
    fn font_preference_overrides_style_lettering() {
        let data = PosterData {
            font_preference: Some("Chữ vàng gold sang trọng".to_string()),
            ..sample()
        };
        assert_eq!(
            singer_font_instruction(&data),
            "RIÊNG TÊN CA SĨ \"Minh Tâm\": Thiết kế theo kiểu Chữ vàng gold sang trọng."
        );
        assert!(build_poster_prompt(&data).contains("Thiết kế theo kiểu Chữ vàng gold sang trọng"));
    }

    #[test]
    fn other_styles_use_their_stage_and_font_description() {
        let data = PosterData {
            style: PosterStyle::Bolero,
            ..sample()
        };
        let prompt = build_poster_prompt(&data);
        assert!(prompt.contains("- Luxury concert stage, warm golden lights"));
        assert!(!prompt.contains("Deep Red Velvet"));
        assert_eq!(
            singer_font_instruction(&data),
            "Font Serif cổ điển hoặc Calligraphy mạ vàng 3D."
        );
    }
}
