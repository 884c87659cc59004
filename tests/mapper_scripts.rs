use dynsql::{BoundSql, ParameterContext, SqlEngine, Value};
use serde_json::json;

// Scripts below are written the way they appear in mapper sources: indented
// blocks whose common indentation is removed, with the closing line setting
// the margin.
fn text_block(raw: &str) -> String {
    let raw = raw.strip_prefix('\n').unwrap_or(raw);
    let lines: Vec<&str> = raw.split('\n').collect();
    let last = lines.len() - 1;
    let margin = lines
        .iter()
        .enumerate()
        .filter(|(i, line)| *i == last || !line.trim().is_empty())
        .map(|(_, line)| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|line| line.get(margin..).unwrap_or("").trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

fn assert_sql(script: &str, params: &ParameterContext, expected: &str) -> BoundSql {
    let engine = SqlEngine::new();
    let bound = engine.render(&text_block(script), params).unwrap();
    assert_eq!(bound.sql, expected);
    bound
}

fn no_params() -> ParameterContext {
    ParameterContext::new()
}

#[test]
fn text_block_strips_the_margin() {
    let block = text_block(
        r#"
            <script>
                a
            </script>
            "#,
    );
    assert_eq!(block, "<script>\n    a\n</script>\n");
}

#[test]
fn where_with_all_conditions() {
    assert_sql(
        r#"
            <script>
                            select * from `user`
                            <where>
                                <if test="true">
                                    1=1
                                </if>
                                and 2=2
                                <if test="true">
                                    and 3=3
                                </if>
                            </where>
                        </script>
            "#,
        &no_params(),
        "select * from `user`  WHERE 1=1  and 2=2  and 3=3",
    );
}

#[test]
fn where_strips_leading_connector_after_false_condition() {
    assert_sql(
        r#"
            <script>
                            select * from `user`
                            <where>
                                <if test="false">
                                    1=1
                                </if>
                                and 2=2
                                <if test="true">
                                    and 3=3
                                </if>
                            </where>
                        </script>
            "#,
        &no_params(),
        "select * from `user`  WHERE  2=2  and 3=3",
    );
}

#[test]
fn where_with_inline_conditions_adds_no_spaces() {
    assert_sql(
        r#"
            <script>
                            select * from `user`
                            <where>
                                <if test="true">1=1</if>and 2=2<if test="true">and 3=3</if>
                            </where>
                        </script>
            "#,
        &no_params(),
        "select * from `user`  WHERE 1=1and 2=2and 3=3",
    );
}

#[test]
fn conditions_on_separate_lines_keep_interior_newline() {
    assert_sql(
        r#"
            <script>
                            select * from `user`
                            where 1=1
                            <if test="1==1">and id is not null</if>
                            <if test="1==1">and name is not null</if>
                        </script>
            "#,
        &no_params(),
        "select * from `user`\n                where 1=1  and id is not null   and name is not null",
    );
}

#[test]
fn adjacent_conditions_are_joined_by_one_space() {
    assert_sql(
        r#"
            <script>
                            select * from `user`
                            where 1=1
                            <if test="1==1">and id is not null</if><if test="1==1">and name is not null</if>
                        </script>
            "#,
        &no_params(),
        "select * from `user`\n                where 1=1  and id is not null and name is not null",
    );
}

#[test]
fn adjacent_conditions_inside_where_are_concatenated() {
    assert_sql(
        r#"
            <script>
                            select * from `user`
                            <where>
                            <if test="1==1">and id is not null</if><if test="1==1">and name is not null</if>
                            </where>
                        </script>
            "#,
        &no_params(),
        "select * from `user`  WHERE  id is not nulland name is not null",
    );
}

#[test]
fn separate_conditions_inside_where() {
    assert_sql(
        r#"
            <script>
                            select * from `user`
                            <where>
                            <if test="1==1">and id is not null</if>
                            <if test="1==1">and name is not null</if>
                            </where>
                        </script>
            "#,
        &no_params(),
        "select * from `user`  WHERE  id is not null and name is not null",
    );
}

#[test]
fn single_line_prefix_with_adjacent_conditions() {
    assert_sql(
        r#"
            <script>
                            select * from `user` where 1 = 1
                            <if test="1==1">and id is not null</if><if test="1==1">and name is not null</if>
                        </script>
            "#,
        &no_params(),
        "select * from `user` where 1 = 1  and id is not null and name is not null",
    );
}

#[test]
fn single_line_prefix_with_separate_conditions() {
    assert_sql(
        r#"
            <script>
                            select * from `user` where 1 = 1
                            <if test="1==1">and id is not null</if>
                            <if test="1==1">and name is not null</if>
                        </script>
            "#,
        &no_params(),
        "select * from `user` where 1 = 1  and id is not null   and name is not null",
    );
}

#[test]
fn foreach_with_open_close_and_separator() {
    let bound = assert_sql(
        r#"
            <script>
                            select * from `user` where 1 = 1 and id in
                            <foreach collection='@java.util.Arrays@asList(1,2,3,4,5)' item='item' separator=',' open='(' close=')'>
                                #{item}
                            </foreach>
                        </script>
            "#,
        &no_params(),
        "select * from `user` where 1 = 1 and id in  (   ?  ,  ?  ,  ?  ,  ?  ,  ?  )",
    );
    let expected: Vec<Value> = (1..=5).map(Value::Int).collect();
    assert_eq!(bound.values(), expected.iter().collect::<Vec<_>>());
}

#[test]
fn foreach_separator_only_before_contributing_elements() {
    assert_sql(
        r#"
            <script>
                            select * from `user` where 1 = 1 and
                            <foreach collection='@java.util.Arrays@asList(1,2,3,4,5)' item='item' separator='and'>
                                <if test="item == 1">id is not null</if>
                                <if test="item == 2">name is not null</if>
                                <if test="item == 3">age is not null</if>
                            </foreach>
                        </script>
            "#,
        &no_params(),
        "select * from `user` where 1 = 1 and     id is not null           and name is not null           and age is not null",
    );
}

fn user_update() -> ParameterContext {
    ParameterContext::from_json(json!({
        "username": "ann",
        "email": "ann@example.com",
        "bio": "hi",
        "id": 42
    }))
}

#[test]
fn set_strips_trailing_comma() {
    let bound = assert_sql(
        r#"
            <script>
                   update user
                   <set>
                         <if test="true">username=#{username},</if>
                         <if test="false">password=#{password},</if>
                         <if test="true">email=#{email},</if>
                         <if test="true">bio=#{bio},</if>
                       </set>
                     where id=#{id}
            </script>
            "#,
        &user_update(),
        "update user  SET username=?,  email=?, bio=?  where id=?",
    );
    let properties: Vec<&str> = bound.bindings.iter().map(|b| b.property.as_str()).collect();
    assert_eq!(properties, vec!["username", "email", "bio", "id"]);
}

#[test]
fn comment_before_set_adds_no_space() {
    assert_sql(
        r#"
            <script>
                   update user
                   <!--这是一条更新语句-->
                   <set>
                         <if test="true">username=#{username},</if>
                         <if test="false">password=#{password},</if>
                         <if test="true">email=#{email},</if>
                         <if test="true">bio=#{bio},</if>
                       </set>
                     where id=#{id}
            </script>
            "#,
        &user_update(),
        "update user  SET username=?,  email=?, bio=?  where id=?",
    );
}

#[test]
fn bind_between_fragments_keeps_their_delimiters() {
    assert_sql(
        r#"
            <script>
                   update user
                   <!--这是一条更新语句-->
                   <bind name="name" value="'test'" />
                   <set>
                         <if test="true">username=#{username},</if>
                         <if test="false">password=#{password},</if>
                         <if test="true">email=#{email},</if>
                         <if test="true">bio=#{bio},</if>
                       </set>
                     where id=#{id}
            </script>
            "#,
        &user_update(),
        "update user    SET username=?,  email=?, bio=?  where id=?",
    );
}

#[test]
fn multiline_comment_inside_where() {
    assert_sql(
        r#"
            <script>
                            select * from `user`
                            <where>
                            <!--
                                 查了点东西啊
                                 12345
                                 789
                            -->
                                <if test="true">1=1</if>and 2=2<if test="true">and 3=3</if>
                            </where>
                        </script>
            "#,
        &no_params(),
        "select * from `user`  WHERE 1=1and 2=2and 3=3",
    );
}

#[test]
fn choose_falls_back_to_otherwise() {
    assert_sql(
        r#"
            <script>
                            select * from `user`
                            <where>
                                <choose>
                                    <when test="false">
                                        and age > #{age}
                                    </when>
                                    <when test="false">
                                        and name like concat(#{name},'%')
                                    </when>
                                    <otherwise>
                                        and sex = '男'
                                    </otherwise>
                                </choose>
                            </where>
                        </script>
            "#,
        &no_params(),
        "select * from `user`  WHERE  sex = '男'",
    );
}

#[test]
fn choose_renders_first_true_branch() {
    let bound = assert_sql(
        r#"
            <script>
                            select * from `user`
                            <where>
                                <choose>
                                    <when test="false">
                                        and age > #{age}
                                    </when>
                                    <when test="true">
                                        and name like concat(#{name},'%')
                                    </when>
                                    <otherwise>
                                        and sex = '男'
                                    </otherwise>
                                </choose>
                            </where>
                        </script>
            "#,
        &ParameterContext::new().with("name", "ann"),
        "select * from `user`  WHERE  name like concat(?,'%')",
    );
    assert_eq!(bound.values(), vec![&Value::from("ann")]);
}

#[test]
fn text_after_where_follows_the_clause() {
    assert_sql(
        r#"
            <script>
                            select * from `user`
                            <where>
                                <choose>
                                    <when test="false">
                                        and age > #{age}
                                    </when>
                                    <when test="true">and name like concat(#{name},'%')</when>
                                    <otherwise>
                                        and sex = '男'
                                    </otherwise>
                                </choose>
                            </where>
                            and 1=1
                        </script>
            "#,
        &ParameterContext::new().with("name", "ann"),
        "select * from `user`  WHERE  name like concat(?,'%')  and 1=1",
    );
}
